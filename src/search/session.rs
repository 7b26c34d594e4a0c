//! Browse-session token used as the engine's ordering preference

use super::pager::PageRequest;
use uuid::Uuid;

/// Opaque token shared by the pages of one browse session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchSession {
    token: String,
}

/// Outcome of session resolution for one request
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SessionDecision {
    pub session: Option<SearchSession>,
    /// Whether the response should (re)issue the cookie
    pub set_cookie: bool,
}

impl SearchSession {
    pub fn new() -> Self {
        Self {
            token: Uuid::new_v4().to_string(),
        }
    }

    /// Session carried by a `Cookie` header, if it holds a well-formed token
    pub fn from_cookie_header(header: &str, cookie_name: &str) -> Option<Self> {
        header
            .split(';')
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(name, _)| *name == cookie_name)
            .and_then(|(_, value)| Uuid::parse_str(value.trim()).ok())
            .map(|uuid| Self {
                token: uuid.to_string(),
            })
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn set_cookie_header(&self, cookie_name: &str) -> String {
        format!("{}={}; Path=/; HttpOnly; SameSite=Lax", cookie_name, self.token)
    }

    /// Pick the session for a request.
    ///
    /// Only bounded, top-level requests take part. The first page reuses the
    /// caller's token or starts a new one; later pages reuse an existing token
    /// without creating one.
    pub fn resolve(
        existing: Option<SearchSession>,
        page: &PageRequest,
        internal: bool,
    ) -> SessionDecision {
        if internal || page.is_exhaustive() {
            return SessionDecision::default();
        }

        if page.from == 0 {
            SessionDecision {
                session: Some(existing.unwrap_or_default()),
                set_cookie: true,
            }
        } else {
            SessionDecision {
                session: existing,
                set_cookie: false,
            }
        }
    }
}

impl Default for SearchSession {
    fn default() -> Self {
        Self::new()
    }
}
