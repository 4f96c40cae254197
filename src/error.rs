use std::fmt::{Debug, Display};
use std::io::Error as IoError;

use actix_web::error::{JsonPayloadError, PathError, QueryPayloadError};
use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use awc::error::{JsonPayloadError as RemotePayloadError, SendRequestError};
use derivative::Derivative;
use mongodb::error::Error as DatabaseError;
use serde::{Serialize, Serializer};
use serde_json::Error as JsonError;

use crate::closure::policy::{PromptChoice, PromptLevel};

#[derive(Debug, Serialize, Derivative)]
#[derivative(PartialEq, Eq)]
#[serde(untagged)]
pub enum Error {
    // 400
    #[serde(serialize_with = "display")]
    InvalidJson(#[derivative(PartialEq = "ignore")] JsonPayloadError),
    #[serde(serialize_with = "display")]
    InvalidPath(#[derivative(PartialEq = "ignore")] PathError),
    #[serde(serialize_with = "display")]
    InvalidQuery(#[derivative(PartialEq = "ignore")] QueryPayloadError),
    ReasonRequired {
        campaign_id: String,
    },

    // 404
    PathNotFound,

    // 409
    NoPromptOpen {
        campaign_id: String,
    },
    ChoiceNotOffered {
        campaign_id: String,
        prompt: PromptLevel,
        choice: PromptChoice,
    },

    // 500
    InvalidConfig(String),
    #[serde(serialize_with = "display")]
    FailedDatabaseCall(#[derivative(PartialEq = "ignore")] DatabaseError),
    #[serde(serialize_with = "display")]
    FailedToSerializeJson(#[derivative(PartialEq = "ignore")] JsonError),
    #[serde(serialize_with = "display")]
    IoError(#[derivative(PartialEq = "ignore")] IoError),

    // 502
    #[serde(serialize_with = "display")]
    FailedRemoteCall(#[derivative(PartialEq = "ignore")] SendRequestError),
    #[serde(serialize_with = "display")]
    FailedToDecodeRemote(#[derivative(PartialEq = "ignore")] RemotePayloadError),
    RemoteStatus {
        status: u16,
    },
}

impl Error {
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::InvalidJson(_) => "E4001000",
            Error::InvalidPath(_) => "E4001001",
            Error::InvalidQuery(_) => "E4001003",
            Error::ReasonRequired { .. } => "E4001004",
            Error::PathNotFound => "E4041000",
            Error::NoPromptOpen { .. } => "E4091000",
            Error::ChoiceNotOffered { .. } => "E4091001",
            Error::InvalidConfig(_) => "E5001000",
            Error::FailedDatabaseCall(_) => "E5001001",
            Error::FailedToSerializeJson(_) => "E5001002",
            Error::IoError(_) => "E5001003",
            Error::FailedRemoteCall(_) => "E5021000",
            Error::FailedToDecodeRemote(_) => "E5021001",
            Error::RemoteStatus { .. } => "E5021002",
        }
    }

    pub fn error_message(&self) -> &'static str {
        match self {
            Error::InvalidJson(_) => "The given json could not be parsed",
            Error::InvalidPath(_) => "The given path could not be parsed",
            Error::InvalidQuery(_) => "The given query could not be parsed",
            Error::ReasonRequired { .. } => "A reason is required for this choice",
            Error::PathNotFound => "The requested path was not found",
            Error::NoPromptOpen { .. } => "There is no open prompt for the requested campaign",
            Error::ChoiceNotOffered { .. } => "The requested choice is not offered by the open prompt",
            Error::InvalidConfig(_) => "The server configuration is invalid",
            Error::FailedDatabaseCall(_) => {
                "An error occurred when communicating with the database"
            }
            Error::FailedToSerializeJson(_) => {
                "An error occurred when serializing an object to json"
            }
            Error::IoError(_) => "An error occurred during an I/O operation",
            Error::FailedRemoteCall(_) => {
                "An error occurred when communicating with the insight service"
            }
            Error::FailedToDecodeRemote(_) => {
                "The insight service responded with an unreadable body"
            }
            Error::RemoteStatus { .. } => "The insight service responded with an error status",
        }
    }
}

impl ResponseError for Error {
    fn status_code(&self) -> StatusCode {
        match self {
            Error::InvalidJson(_) => StatusCode::BAD_REQUEST,
            Error::InvalidPath(_) => StatusCode::BAD_REQUEST,
            Error::InvalidQuery(_) => StatusCode::BAD_REQUEST,
            Error::ReasonRequired { .. } => StatusCode::BAD_REQUEST,
            Error::PathNotFound => StatusCode::NOT_FOUND,
            Error::NoPromptOpen { .. } => StatusCode::CONFLICT,
            Error::ChoiceNotOffered { .. } => StatusCode::CONFLICT,
            Error::InvalidConfig(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::FailedDatabaseCall(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::FailedToSerializeJson(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::IoError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::FailedRemoteCall(_) => StatusCode::BAD_GATEWAY,
            Error::FailedToDecodeRemote(_) => StatusCode::BAD_GATEWAY,
            Error::RemoteStatus { .. } => StatusCode::BAD_GATEWAY,
        }
    }

    fn error_response(&self) -> HttpResponse {
        #[derive(Serialize)]
        struct Dummy<'a> {
            error_code: &'static str,
            error_message: &'static str,
            error_meta: &'a Error,
        }

        HttpResponse::build(self.status_code()).json(&Dummy {
            error_code: self.error_code(),
            error_message: self.error_message(),
            error_meta: self,
        })
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
        Debug::fmt(self, f)
    }
}

impl From<DatabaseError> for Error {
    fn from(error: DatabaseError) -> Error {
        Error::FailedDatabaseCall(error)
    }
}

impl From<JsonError> for Error {
    fn from(error: JsonError) -> Error {
        Error::FailedToSerializeJson(error)
    }
}

impl From<IoError> for Error {
    fn from(error: IoError) -> Error {
        Error::IoError(error)
    }
}

impl From<SendRequestError> for Error {
    fn from(error: SendRequestError) -> Error {
        Error::FailedRemoteCall(error)
    }
}

impl From<RemotePayloadError> for Error {
    fn from(error: RemotePayloadError) -> Error {
        Error::FailedToDecodeRemote(error)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::InvalidJson(err) => Some(err),
            Error::InvalidPath(err) => Some(err),
            Error::InvalidQuery(err) => Some(err),
            Error::FailedDatabaseCall(err) => Some(err),
            Error::FailedToSerializeJson(err) => Some(err),
            Error::IoError(err) => Some(err),
            _ => None,
        }
    }
}

fn display<T, S>(value: &T, serializer: S) -> Result<S::Ok, S::Error>
where
    T: Display,
    S: Serializer,
{
    serializer.collect_str(value)
}
