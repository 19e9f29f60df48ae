use axum::Json;
use bcrypt::{DEFAULT_COST, hash, verify};
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::Config;
use crate::permissions::Role;

pub fn hash_password(password: &str) -> Result<String, bcrypt::BcryptError> {
    hash(password.as_bytes(), DEFAULT_COST)
}

pub fn verify_password(password: &str, hash: &str) -> Result<bool, bcrypt::BcryptError> {
    verify(password.as_bytes(), hash)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,   // 用户ID
    pub role: Role,    // 角色，签发时固化进token
    pub exp: i64,      // 过期时间
    pub iat: i64,      // 签发时间
    pub is_temp: bool, // 临时标识
}

pub fn generate_token(
    user_id: &str,
    role: Role,
    config: &Config,
) -> Result<String, jsonwebtoken::errors::Error> {
    issue_token(user_id, role, config.jwt_expiration_secs, false, config)
}

pub fn generate_temp_token(
    user_id: &str,
    config: &Config,
) -> Result<String, jsonwebtoken::errors::Error> {
    issue_token(
        user_id,
        Role::Attendee,
        config.temp_token_expiration_secs,
        true,
        config,
    )
}

fn issue_token(
    user_id: &str,
    role: Role,
    lifetime_secs: u64,
    is_temp: bool,
    config: &Config,
) -> Result<String, jsonwebtoken::errors::Error> {
    let now = Utc::now();
    let expiration = now
        .checked_add_signed(Duration::seconds(lifetime_secs as i64))
        .expect("valid timestamp")
        .timestamp();

    let claims = Claims {
        sub: user_id.to_string(),
        role,
        exp: expiration,
        iat: now.timestamp(),
        is_temp,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
    )
}

pub fn verify_token(token: &str, config: &Config) -> Result<Claims, jsonwebtoken::errors::Error> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.jwt_secret.as_bytes()),
        &Validation::default(),
    )?;

    Ok(token_data.claims)
}

const JOIN_CODE_LEN: usize = 6;
// 去掉易混淆字符（0/O、1/I/L）后的字母表
const JOIN_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";

/// 由群组ID确定性派生加入码。同一个群组永远得到同一个码。
pub fn derive_join_code(group_id: &str) -> String {
    let digest = Sha256::digest(group_id.as_bytes());
    digest
        .iter()
        .take(JOIN_CODE_LEN)
        .map(|b| JOIN_CODE_ALPHABET[*b as usize % JOIN_CODE_ALPHABET.len()] as char)
        .collect()
}

/// Haversine球面距离（米）
pub fn calculate_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let r = 6371000.0; // 地球半径（米）
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let delta_phi = (lat2 - lat1).to_radians();
    let delta_lambda = (lon2 - lon1).to_radians();

    let a = (delta_phi / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (delta_lambda / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    r * c
}

#[derive(Serialize)]
pub struct ApiResponse<T> {
    pub code: i32,
    pub msg: String,
    pub resp_data: Option<T>,
}

pub fn success_to_api_response<T: Serialize>(data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse {
        code: 0,
        msg: "success".into(),
        resp_data: Some(data),
    })
}

pub fn error_to_api_response<T>(code: i32, msg: String) -> Json<ApiResponse<T>> {
    Json(ApiResponse {
        code,
        msg,
        resp_data: None,
    })
}

pub mod error_codes {
    pub const SUCCESS: i32 = 0;
    pub const VALIDATION_ERROR: i32 = 1000;
    pub const USER_EXISTS: i32 = 1001;
    pub const AUTH_FAILED: i32 = 1002;
    pub const PERMISSION_DENIED: i32 = 1003;
    pub const NOT_FOUND: i32 = 1004;
    pub const RATE_LIMIT: i32 = 1005;
    pub const ALREADY_IN_STATE: i32 = 1006;
    pub const INTERNAL_ERROR: i32 = 5000;
    pub const TRANSIENT_IO: i32 = 5001;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_code_is_deterministic_per_group() {
        let a = derive_join_code("personal-u1");
        let b = derive_join_code("personal-u1");
        assert_eq!(a, b);
        assert_eq!(a.len(), JOIN_CODE_LEN);
    }

    #[test]
    fn join_codes_differ_between_groups() {
        assert_ne!(derive_join_code("personal-u1"), derive_join_code("personal-u2"));
    }

    #[test]
    fn join_code_uses_unambiguous_alphabet() {
        let code = derive_join_code("some-group");
        for c in code.chars() {
            assert!(JOIN_CODE_ALPHABET.contains(&(c as u8)), "unexpected char {c}");
        }
    }

    #[test]
    fn distance_between_identical_points_is_zero() {
        assert!(calculate_distance(31.23, 121.47, 31.23, 121.47) < 1e-6);
    }

    #[test]
    fn distance_is_roughly_correct_for_one_degree_latitude() {
        // 1度纬度约111km
        let d = calculate_distance(31.0, 121.0, 32.0, 121.0);
        assert!((d - 111_000.0).abs() < 1000.0, "got {d}");
    }
}
