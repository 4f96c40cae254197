use serde::Serialize;

/// The (campaign, user, company) triple every closure is keyed by. All
/// three parts are non-blank; construction fails otherwise.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityTriple {
    campaign_id: String,
    user_id: String,
    company_id: String,
}

impl IdentityTriple {
    pub fn new(
        campaign_id: impl Into<String>,
        user_id: impl Into<String>,
        company_id: impl Into<String>,
    ) -> Option<IdentityTriple> {
        let triple = IdentityTriple {
            campaign_id: campaign_id.into(),
            user_id: user_id.into(),
            company_id: company_id.into(),
        };

        let blank = |s: &str| s.trim().is_empty();
        if blank(&triple.campaign_id) || blank(&triple.user_id) || blank(&triple.company_id) {
            return None;
        }

        Some(triple)
    }

    pub fn from_parts(
        campaign_id: Option<String>,
        user_id: Option<String>,
        company_id: Option<String>,
    ) -> Option<IdentityTriple> {
        IdentityTriple::new(campaign_id?, user_id?, company_id?)
    }

    pub fn campaign_id(&self) -> &str {
        &self.campaign_id
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn company_id(&self) -> &str {
        &self.company_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_parts_are_rejected() {
        assert!(IdentityTriple::new("C1", "U1", "CO1").is_some());
        assert!(IdentityTriple::new("", "U1", "CO1").is_none());
        assert!(IdentityTriple::new("C1", "  ", "CO1").is_none());
        assert!(IdentityTriple::from_parts(Some("C1".into()), None, Some("CO1".into())).is_none());
    }
}
