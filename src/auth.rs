//! Bearer-token authentication.
//!
//! This module contains the JWT claims and signing keys, the [Claims]
//! extractor that guards protected routes, and the log-in route handler that
//! issues tokens.

use std::sync::{Arc, Mutex};

use axum::{
    Json, RequestPartsExt,
    extract::{FromRef, FromRequestParts, State},
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Response},
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, TokenData, Validation, decode, encode};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

use crate::{
    AppState, Error,
    api_response::{ApiError, ApiJson, ApiSuccess},
    user::{User, UserID, get_user_by_email},
};

/// The contents of a JSON Web Token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// The ID of the user the token was issued to.
    pub user_id: UserID,
    /// The display name of the user the token was issued to.
    pub name: String,
    /// Email associated with the token.
    pub email: String,
    /// The time the token was issued as a unix timestamp.
    pub iat: usize,
    /// The expiry time of the token as a unix timestamp.
    pub exp: usize,
}

/// How long a bearer token stays valid after being issued.
const TOKEN_DURATION: Duration = Duration::hours(24);

impl Claims {
    /// Build the claims for `user`, issued now and expiring after
    /// [TOKEN_DURATION].
    pub fn new(user: &User) -> Self {
        let now = OffsetDateTime::now_utc();
        let iat = now.unix_timestamp() as usize;
        let exp = (now + TOKEN_DURATION).unix_timestamp() as usize;

        Self {
            user_id: user.user_id,
            name: user.name.clone(),
            email: user.email.clone(),
            iat,
            exp,
        }
    }
}

impl<S> FromRequestParts<S> for Claims
where
    AuthState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) = parts
            .extract::<TypedHeader<Authorization<Bearer>>>()
            .await
            .map_err(|_| AuthError::MissingToken)?;

        let state = AuthState::from_ref(state);
        let token_data = decode_jwt(bearer.token(), &state.jwt_keys)?;

        Ok(token_data.claims)
    }
}

/// The signing and verification keys for bearer tokens, derived from the
/// server secret.
#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl JwtKeys {
    pub fn from_secret(secret: &[u8]) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        }
    }
}

/// The state needed for authentication: the user table for checking
/// credentials and the keys for signing and verifying tokens.
#[derive(Clone)]
pub struct AuthState {
    pub db_connection: Arc<Mutex<Connection>>,
    pub jwt_keys: JwtKeys,
}

impl FromRef<AppState> for AuthState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
            jwt_keys: state.jwt_keys.clone(),
        }
    }
}

/// The request body for log-in requests.
///
/// Fields missing from the JSON deserialize as empty strings, which fail the
/// credential check the same way a wrong password does.
#[derive(Debug, Deserialize)]
pub struct Credentials {
    /// Email entered during log-in.
    #[serde(default)]
    pub email: String,
    /// Password entered during log-in.
    #[serde(default)]
    pub password: String,
}

/// The response body for a successful log-in.
#[derive(Debug, Serialize)]
pub struct SessionData {
    /// The bearer token the client should send on subsequent requests.
    pub token: String,
    /// The profile of the user that logged in.
    pub user: User,
}

/// The ways authenticating a request can fail.
///
/// This is the rejection of the [Claims] extractor. It produces the same
/// response envelope as [crate::Error] but lives here so the extractor does
/// not depend on the crate-wide error type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    /// The request has no usable `Authorization: Bearer` header.
    MissingToken,
    /// The token failed verification or has expired.
    InvalidToken,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AuthError::MissingToken => (StatusCode::UNAUTHORIZED, "Token missing."),
            AuthError::InvalidToken => (
                StatusCode::UNAUTHORIZED,
                "You are not authorized to use these resources.",
            ),
        };

        (status, Json(ApiError::new(message))).into_response()
    }
}

/// A route handler for log-in requests. Verifies the credentials and issues a
/// bearer token.
///
/// Unknown emails and wrong passwords produce the same error so a caller
/// cannot tell which addresses are registered.
///
/// # Errors
///
/// This function will return an error if:
/// - the email does not belong to a registered user ([Error::WrongCredentials]).
/// - the password is not correct ([Error::WrongCredentials]).
/// - an internal error occurred when verifying the password ([Error::HashingError]).
pub async fn log_in(
    State(state): State<AuthState>,
    ApiJson(credentials): ApiJson<Credentials>,
) -> Result<ApiSuccess<SessionData>, Error> {
    let user = {
        let connection = state
            .db_connection
            .lock()
            .inspect_err(|error| tracing::error!("could not acquire database lock: {error}"))
            .map_err(|_| Error::DatabaseLockError)?;

        get_user_by_email(&credentials.email, &connection).map_err(|error| match error {
            Error::NotFound => Error::WrongCredentials,
            error => error,
        })?
    };

    let password_is_correct = user
        .password_hash
        .verify(&credentials.password)
        .map_err(|error| {
            tracing::error!("error verifying password: {error}");
            Error::HashingError(error.to_string())
        })?;

    if !password_is_correct {
        return Err(Error::WrongCredentials);
    }

    let claims = Claims::new(&user);
    let token = encode_jwt(&claims, &state.jwt_keys)?;

    Ok(ApiSuccess::new(SessionData { token, user }))
}

/// Sign `claims` into a compact JWT.
///
/// # Errors
///
/// This function will return an error if the token could not be signed
/// ([Error::TokenCreation]).
pub fn encode_jwt(claims: &Claims, keys: &JwtKeys) -> Result<String, Error> {
    encode(&Header::default(), claims, &keys.encoding)
        .map_err(|error| Error::TokenCreation(error.to_string()))
}

fn decode_jwt(token: &str, keys: &JwtKeys) -> Result<TokenData<Claims>, AuthError> {
    decode(token, &keys.decoding, &Validation::default()).map_err(|_| AuthError::InvalidToken)
}

#[cfg(test)]
mod jwt_tests {
    use time::OffsetDateTime;

    use crate::{
        PasswordHash,
        user::{User, UserID},
    };

    use super::{AuthError, Claims, JwtKeys, decode_jwt, encode_jwt};

    fn get_test_user() -> User {
        User {
            user_id: UserID::new(1),
            name: "Alice".to_string(),
            email: "alice@example.com".to_string(),
            created_at: OffsetDateTime::now_utc(),
            password_hash: PasswordHash::new_unchecked("hunter2"),
        }
    }

    #[test]
    fn round_trip_preserves_claims() {
        let keys = JwtKeys::from_secret(b"foobar");
        let user = get_test_user();

        let token = encode_jwt(&Claims::new(&user), &keys).expect("Could not encode token");
        let claims = decode_jwt(&token, &keys)
            .expect("Could not decode token")
            .claims;

        assert_eq!(claims.user_id, user.user_id);
        assert_eq!(claims.name, user.name);
        assert_eq!(claims.email, user.email);
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn decode_fails_with_wrong_secret() {
        let user = get_test_user();
        let token = encode_jwt(&Claims::new(&user), &JwtKeys::from_secret(b"foobar"))
            .expect("Could not encode token");

        let result = decode_jwt(&token, &JwtKeys::from_secret(b"not the secret"));

        assert!(matches!(result, Err(AuthError::InvalidToken)));
    }

    #[test]
    fn decode_fails_with_expired_token() {
        let keys = JwtKeys::from_secret(b"foobar");
        let user = get_test_user();
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let claims = Claims {
            user_id: user.user_id,
            name: user.name,
            email: user.email,
            iat: (now - 7200) as usize,
            exp: (now - 3600) as usize,
        };

        let token = encode_jwt(&claims, &keys).expect("Could not encode token");
        let result = decode_jwt(&token, &keys);

        assert!(matches!(result, Err(AuthError::InvalidToken)));
    }
}


#[cfg(test)]
mod claims_extractor_tests {
    use std::sync::{Arc, Mutex};

    use axum::{Router, http::StatusCode, routing::get};
    use axum_test::TestServer;
    use rusqlite::Connection;
    use serde_json::Value;
    use time::OffsetDateTime;

    use crate::{
        PasswordHash,
        user::{User, UserID},
    };

    use super::{AuthState, Claims, JwtKeys, encode_jwt};

    async fn protected_handler(claims: Claims) -> String {
        claims.email
    }

    fn get_test_state() -> AuthState {
        let connection =
            Connection::open_in_memory().expect("Could not open in-memory SQLite database");

        AuthState {
            db_connection: Arc::new(Mutex::new(connection)),
            jwt_keys: JwtKeys::from_secret(b"foobar"),
        }
    }

    fn get_test_server(state: AuthState) -> TestServer {
        let app = Router::new()
            .route("/protected", get(protected_handler))
            .with_state(state);

        TestServer::new(app)
    }

    fn get_test_token(keys: &JwtKeys) -> String {
        let user = User {
            user_id: UserID::new(1),
            name: "Alice".to_string(),
            email: "alice@example.com".to_string(),
            created_at: OffsetDateTime::now_utc(),
            password_hash: PasswordHash::new_unchecked("hunter2"),
        };

        encode_jwt(&Claims::new(&user), keys).expect("Could not encode token")
    }

    #[tokio::test]
    async fn valid_token_reaches_the_handler() {
        let state = get_test_state();
        let token = get_test_token(&state.jwt_keys);
        let server = get_test_server(state);

        let response = server.get("/protected").authorization_bearer(token).await;

        response.assert_status_ok();
        response.assert_text("alice@example.com");
    }

    #[tokio::test]
    async fn missing_header_is_unauthorized() {
        let server = get_test_server(get_test_state());

        let response = server.get("/protected").await;

        response.assert_status(StatusCode::UNAUTHORIZED);
        assert_eq!(response.json::<Value>()["message"], "Token missing.");
    }

    #[tokio::test]
    async fn garbage_token_is_unauthorized() {
        let server = get_test_server(get_test_state());

        let response = server
            .get("/protected")
            .authorization_bearer("not.a.jwt")
            .await;

        response.assert_status(StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.json::<Value>()["message"],
            "You are not authorized to use these resources."
        );
    }

    #[tokio::test]
    async fn token_signed_with_other_key_is_unauthorized() {
        let token = get_test_token(&JwtKeys::from_secret(b"some other secret"));
        let server = get_test_server(get_test_state());

        let response = server.get("/protected").authorization_bearer(token).await;

        response.assert_status(StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.json::<Value>()["message"],
            "You are not authorized to use these resources."
        );
    }
}
