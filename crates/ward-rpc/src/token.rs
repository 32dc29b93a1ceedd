//! Signed claim envelope codec: `{user, entities, tenants, roles}` plus
//! arbitrary additions, signed with HMAC-SHA256. A single symmetric
//! secret rather than a rotating asymmetric keyset.

use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use ward_types::Claims;

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error(transparent)]
    Codec(#[from] jsonwebtoken::errors::Error),
}

/// A lazily-initialised, process-wide HMAC secret cache. Construct once
/// at startup and clone freely; `jsonwebtoken`'s keys are cheap
/// `Arc`-backed handles internally.
#[derive(Clone)]
pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl TokenCodec {
    pub fn new(secret: &[u8]) -> Self {
        let mut validation = Validation::new(jsonwebtoken::Algorithm::HS256);
        // Claims carry no mandatory `exp`; expiry is a policy concern of
        // the issuing service, not this codec.
        validation.validate_exp = false;
        validation.required_spec_claims.clear();

        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
        }
    }

    pub fn encode(&self, claims: &Claims) -> Result<String, TokenError> {
        Ok(jsonwebtoken::encode(&Header::new(jsonwebtoken::Algorithm::HS256), claims, &self.encoding_key)?)
    }

    pub fn decode(&self, token: &str) -> Result<Claims, TokenError> {
        Ok(jsonwebtoken::decode::<Claims>(token, &self.decoding_key, &self.validation)?.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_then_decode_round_trips_claims() {
        let codec = TokenCodec::new(b"test-secret");
        let claims = Claims::new("alice")
            .with_tenants(["t1".to_string()])
            .with_roles(["admin".to_string()]);

        let token = codec.encode(&claims).unwrap();
        let decoded = codec.decode(&token).unwrap();

        assert_eq!(decoded.user, claims.user);
        assert_eq!(decoded.tenants, claims.tenants);
        assert_eq!(decoded.roles, claims.roles);
    }

    #[test]
    fn decoding_with_the_wrong_secret_fails() {
        let codec = TokenCodec::new(b"right-secret");
        let other = TokenCodec::new(b"wrong-secret");
        let token = codec.encode(&Claims::new("alice")).unwrap();
        assert!(other.decode(&token).is_err());
    }
}
