// ABOUTME: JWT authentication and session token validation for chat routes
// ABOUTME: Issues and validates HS256 bearer tokens carrying the owning user identity
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

//! Authentication and session management
//!
//! Session issuance lives outside this server; what this module owns is the
//! verification boundary: every chat route resolves the caller to an owning
//! user id from a JWT presented as a bearer header or an `auth_token` cookie.

use crate::errors::{AppError, AppResult};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use rand::RngCore;
use serde::{Deserialize, Serialize};

/// Cookie name checked when no authorization header is present
const AUTH_COOKIE: &str = "auth_token";

/// `JWT` claims for user authentication
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// User `ID` (opaque, owner identity for all chat resources)
    pub sub: String,
    /// User email
    pub email: String,
    /// Issued at timestamp
    pub iat: i64,
    /// Expiration timestamp
    pub exp: i64,
}

/// Authentication result with user context
#[derive(Debug, Clone)]
pub struct AuthResult {
    /// Authenticated user `ID`
    pub user_id: String,
    /// Authenticated user email
    pub email: String,
}

/// Authentication manager for `JWT` tokens
#[derive(Clone)]
pub struct AuthManager {
    secret: Vec<u8>,
    token_expiry_hours: i64,
}

impl AuthManager {
    /// Create a new authentication manager
    #[must_use]
    pub fn new(secret: Vec<u8>, token_expiry_hours: i64) -> Self {
        Self {
            secret,
            token_expiry_hours,
        }
    }

    /// Generate a `JWT` token for a user
    ///
    /// # Errors
    ///
    /// Returns an error if JWT encoding fails
    pub fn generate_token(&self, user_id: &str, email: &str) -> AppResult<String> {
        let now = Utc::now();
        let expiry = now + Duration::hours(self.token_expiry_hours);

        let claims = Claims {
            sub: user_id.to_owned(),
            email: email.to_owned(),
            iat: now.timestamp(),
            exp: expiry.timestamp(),
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(&self.secret),
        )
        .map_err(|e| AppError::internal(format!("Failed to encode JWT: {e}")))
    }

    /// Validate a `JWT` token and return its claims
    ///
    /// # Errors
    ///
    /// Returns an error if the signature is invalid, the token has expired,
    /// or the token is malformed
    pub fn validate_token(&self, token: &str) -> AppResult<Claims> {
        decode::<Claims>(
            token,
            &DecodingKey::from_secret(&self.secret),
            &Validation::default(),
        )
        .map(|data| data.claims)
        .map_err(|e| AppError::auth_invalid(format!("Invalid token: {e}")))
    }

    /// Authenticate a request from its headers
    ///
    /// Accepts either an `Authorization: Bearer <token>` header or an
    /// `auth_token` cookie.
    ///
    /// # Errors
    ///
    /// Returns an error if no credentials are present or validation fails
    pub fn authenticate_request(&self, headers: &http::HeaderMap) -> AppResult<AuthResult> {
        let token = extract_token(headers)
            .ok_or_else(|| AppError::auth_invalid("Missing authorization header or cookie"))?;

        let claims = self.validate_token(&token)?;

        Ok(AuthResult {
            user_id: claims.sub,
            email: claims.email,
        })
    }
}

/// Pull a bearer token from the authorization header or the auth cookie
fn extract_token(headers: &http::HeaderMap) -> Option<String> {
    if let Some(auth_header) = headers.get("authorization").and_then(|h| h.to_str().ok()) {
        return auth_header
            .strip_prefix("Bearer ")
            .map(std::borrow::ToOwned::to_owned);
    }

    let cookies = headers.get("cookie").and_then(|h| h.to_str().ok())?;
    cookies.split(';').find_map(|pair| {
        let (name, value) = pair.trim().split_once('=')?;
        (name == AUTH_COOKIE).then(|| value.to_owned())
    })
}

/// Generate a random `JWT` signing secret
#[must_use]
pub fn generate_jwt_secret() -> [u8; 64] {
    let mut secret = [0u8; 64];
    rand::thread_rng().fill_bytes(&mut secret);
    secret
}
