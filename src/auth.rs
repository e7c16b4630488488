use anyhow::{anyhow, Context, Result};
use jsonwebtoken::{decode, decode_header, DecodingKey, Validation};
use serde::Deserialize;

use crate::models::{Provider, UserProfile};

/// Sign-in capability of a platform identity provider. The store only sees
/// the resulting [`UserProfile`], never provider token formats.
pub trait AuthProvider {
    fn initialize(&self) -> Result<()> {
        Ok(())
    }
    fn sign_in(&self) -> Result<UserProfile>;
    fn sign_out(&self) -> Result<()>;
    fn provider(&self) -> Provider;
}

#[derive(Debug, Deserialize)]
struct IdTokenClaims {
    sub: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    given_name: Option<String>,
    #[serde(default)]
    family_name: Option<String>,
    #[serde(default)]
    picture: Option<String>,
}

/// Adapter over an identity token the platform SDK already issued (Google
/// Sign-In, Sign in with Apple). Claims are read, not verified: the token
/// never leaves this machine and only names the local profile.
pub struct IdTokenAuth {
    provider: Provider,
    token: String,
}

impl IdTokenAuth {
    pub fn new(provider: Provider, token: &str) -> Self {
        Self {
            provider,
            token: token.trim().to_string(),
        }
    }

    fn claims(&self) -> Result<IdTokenClaims> {
        let header = decode_header(&self.token).context("Identity token is malformed")?;

        let mut validation = Validation::new(header.alg);
        validation.insecure_disable_signature_validation();
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        let data = decode::<IdTokenClaims>(&self.token, &DecodingKey::from_secret(&[]), &validation)
            .context("Identity token claims could not be read")?;
        Ok(data.claims)
    }
}

impl AuthProvider for IdTokenAuth {
    fn initialize(&self) -> Result<()> {
        if self.token.is_empty() {
            return Err(anyhow!("No identity token supplied"));
        }
        Ok(())
    }

    fn sign_in(&self) -> Result<UserProfile> {
        self.initialize()?;
        let claims = self.claims()?;
        if claims.sub.trim().is_empty() {
            return Err(anyhow!("Identity token has no subject"));
        }
        tracing::info!(provider = self.provider.as_str(), "signed in");
        Ok(profile_from_claims(self.provider, claims))
    }

    // Nothing to revoke locally; the store drops the saved profile.
    fn sign_out(&self) -> Result<()> {
        Ok(())
    }

    fn provider(&self) -> Provider {
        self.provider
    }
}

fn profile_from_claims(provider: Provider, claims: IdTokenClaims) -> UserProfile {
    let given = claims.given_name.filter(|s| !s.is_empty());
    let family = claims.family_name.filter(|s| !s.is_empty());
    let name = claims.name.filter(|s| !s.is_empty());

    let (name, email) = match provider {
        Provider::Google => (
            name.or(given).unwrap_or_else(|| "Google User".to_string()),
            claims.email.unwrap_or_default(),
        ),
        // Apple only sends the name on the very first sign-in
        Provider::Apple => (
            name.or_else(|| match (given, family) {
                (Some(g), Some(f)) => Some(format!("{} {}", g, f)),
                (Some(g), None) => Some(g),
                _ => None,
            })
            .unwrap_or_else(|| "Apple User".to_string()),
            claims
                .email
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "private@apple.id".to_string()),
        ),
    };

    UserProfile {
        id: claims.sub,
        name,
        email,
        picture: claims.picture.filter(|s| !s.is_empty()),
        provider: Some(provider),
    }
}
