use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::user::UserRole;
use crate::error::{AppError, AppResult};

/// Claims of a token issued by the auth provider
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: Uuid,       // user id
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default = "default_role")]
    pub role: UserRole,
    pub exp: i64,        // expiration timestamp
    pub iat: i64,        // issued at timestamp
}

fn default_role() -> UserRole {
    UserRole::Member
}

pub fn verify_token(token: &str, secret: &str) -> AppResult<Claims> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| AppError::Unauthorized(format!("Invalid token: {}", e)))
}

#[cfg(test)]
pub(crate) fn create_token(user_id: Uuid, role: UserRole, secret: &str) -> String {
    use chrono::{Duration, Utc};
    use jsonwebtoken::{encode, EncodingKey, Header};

    let now = Utc::now();
    let claims = Claims {
        sub: user_id,
        name: Some("Test User".to_string()),
        role,
        exp: (now + Duration::hours(1)).timestamp(),
        iat: now.timestamp(),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_provider_token() {
        let id = Uuid::new_v4();
        let token = create_token(id, UserRole::Admin, "secret");

        let claims = verify_token(&token, "secret").unwrap();
        assert_eq!(claims.sub, id);
        assert_eq!(claims.role, UserRole::Admin);
    }

    #[test]
    fn rejects_wrong_secret() {
        let token = create_token(Uuid::new_v4(), UserRole::Member, "secret");
        assert!(matches!(
            verify_token(&token, "other"),
            Err(AppError::Unauthorized(_))
        ));
    }

    #[test]
    fn role_defaults_to_member() {
        use jsonwebtoken::{encode, EncodingKey, Header};

        let exp = chrono::Utc::now().timestamp() + 3600;
        let raw = serde_json::json!({ "sub": Uuid::new_v4(), "exp": exp, "iat": 0 });
        let token = encode(&Header::default(), &raw, &EncodingKey::from_secret(b"s")).unwrap();

        assert_eq!(verify_token(&token, "s").unwrap().role, UserRole::Member);
    }
}
