use base64::Engine;
use std::str::FromStr;

/// Credentials attached to every remote request
#[derive(Clone, PartialEq, Eq)]
pub enum Auth {
    /// Use a bearer token via the Authorization header
    Bearer(String),
    /// Use username and password authentication via Basic Auth headers
    Basic(String, String),
    /// Don't use any authentication
    None,
}

impl Auth {
    pub fn new(
        r#type: &AuthType,
        username: Option<String>,
        password: Option<String>,
        token: Option<String>,
    ) -> Self {
        match (r#type, username, password, token) {
            (AuthType::Bearer, _, _, Some(token)) => Self::Bearer(token),
            (AuthType::Basic, Some(username), Some(password), _) => Self::Basic(username, password),
            (AuthType::None, _, _, _) | _ => Self::None,
        }
    }

    /// Pick the strongest method the supplied credentials allow: a token
    /// wins over a username/password pair
    pub fn infer(
        username: Option<String>,
        password: Option<String>,
        token: Option<String>,
    ) -> Self {
        let r#type = match (&username, &password, &token) {
            (_, _, Some(_)) => AuthType::Bearer,
            (Some(_), Some(_), None) => AuthType::Basic,
            _ => AuthType::None,
        };
        Self::new(&r#type, username, password, token)
    }

    /// Value of the Authorization header, if any
    pub fn header_value(&self) -> Option<String> {
        match self {
            Self::Bearer(token) => Some(format!("Bearer {}", token)),
            Self::Basic(username, password) => {
                let credentials = base64::engine::general_purpose::STANDARD
                    .encode(format!("{}:{}", username, password));
                Some(format!("Basic {}", credentials))
            }
            Self::None => None,
        }
    }
}

impl std::fmt::Display for Auth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bearer(_) => write!(f, "Bearer"),
            Self::Basic(_, _) => write!(f, "Basic"),
            Self::None => write!(f, "None"),
        }
    }
}

// Credentials never appear in debug output
impl std::fmt::Debug for Auth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Auth::{}", self)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AuthType {
    Bearer,
    Basic,
    None,
}

impl FromStr for AuthType {
    type Err = ();
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "bearer" | "token" => Ok(Self::Bearer),
            "basic" => Ok(Self::Basic),
            "none" => Ok(Self::None),
            _ => Err(()),
        }
    }
}
