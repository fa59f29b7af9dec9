use url::Url;

use super::session::SessionHandle;
use crate::config::IdentityProviderConfig;

/// Builds the provider redirect for a verification session.
///
/// Construction only reads configuration that [`IdentityProviderConfig::from_env`]
/// already validated, so building a URL cannot fail per request.
#[derive(Debug, Clone)]
pub struct AuthorizationUrlBuilder {
    authorize_url: Url,
    client_id: String,
    redirect_uri: Url,
    scope: String,
    acr_values: Option<String>,
}

impl AuthorizationUrlBuilder {
    pub fn new(config: &IdentityProviderConfig) -> Self {
        Self {
            authorize_url: config.authorize_url.clone(),
            client_id: config.client_id.clone(),
            redirect_uri: config.redirect_uri.clone(),
            scope: config.scopes.join(" "),
            acr_values: config.acr_values.clone(),
        }
    }

    pub fn build(&self, session: &SessionHandle) -> Url {
        let mut url = self.authorize_url.clone();
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("response_type", "code")
                .append_pair("client_id", &self.client_id)
                .append_pair("redirect_uri", self.redirect_uri.as_str())
                .append_pair("scope", &self.scope)
                .append_pair("state", &session.state)
                .append_pair("nonce", &session.nonce)
                .append_pair("code_challenge", &session.code_challenge)
                .append_pair("code_challenge_method", "S256");
            if let Some(acr) = &self.acr_values {
                query.append_pair("acr_values", acr);
            }
        }
        url
    }
}
