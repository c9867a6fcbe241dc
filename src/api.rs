use std::thread;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use reqwest::blocking::{Client as HttpClient, Response};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use url::Url;

use crate::catalog::{MovieDetail, MovieStub, PersonDetail};

pub const DEFAULT_BASE_URL: &str = "http://4.237.58.241:3000/";

const RATE_LIMIT_BACKOFF: Duration = Duration::from_secs(1);

/// Failure taxonomy for every catalog and auth call. Enrichment swallows
/// these per item; everything else propagates them to the caller.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("network error: {0}")]
    Network(#[source] reqwest::Error),
    #[error("api error: status {status}")]
    Http { status: u16 },
    #[error("rate limited")]
    RateLimited,
    #[error("unexpected response: {0}")]
    Format(&'static str),
    #[error("session expired, sign in again")]
    SessionExpired,
    #[error("{message}")]
    Auth { message: String },
}

/// Hands the API client a bearer token and owns the refresh-on-401 flow.
/// Implemented by the session manager; mocked in tests.
pub trait SessionRefresher: Send + Sync {
    fn access_token(&self) -> Option<String>;
    /// Runs one refresh attempt and returns the new access token. A failed
    /// refresh is terminal: the implementation clears the session before
    /// returning the error.
    fn refresh_access_token(&self) -> Result<String, Error>;
    fn force_logout(&self);
}

#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    pub user_agent: String,
    pub base_url: Option<String>,
    pub http_client: Option<HttpClient>,
    /// Fixed backoff before the single 429 retry. Overridden in tests.
    pub rate_limit_backoff: Option<Duration>,
}

pub struct Client {
    http: HttpClient,
    user_agent: String,
    base_url: Url,
    rate_limit_backoff: Duration,
}

#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: u64,
}

impl Client {
    pub fn new(config: ClientConfig) -> Result<Self> {
        if config.user_agent.trim().is_empty() {
            bail!("api client user agent required");
        }
        let base = config
            .base_url
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let base_url = Url::parse(&base).context("api: parse base url")?;
        let http = match config.http_client {
            Some(client) => client,
            None => HttpClient::builder()
                .timeout(Duration::from_secs(20))
                .build()?,
        };

        Ok(Client {
            http,
            user_agent: config.user_agent,
            base_url,
            rate_limit_backoff: config.rate_limit_backoff.unwrap_or(RATE_LIMIT_BACKOFF),
        })
    }

    /// GET /movies/search with only the provided filters plus the mandatory
    /// page number. An empty result set is not an error.
    pub fn search_movies(
        &self,
        title: Option<&str>,
        year: Option<i32>,
        genre: Option<&str>,
        page: u32,
    ) -> Result<Vec<MovieStub>, Error> {
        let mut url = self.endpoint("movies/search")?;
        {
            let mut pairs = url.query_pairs_mut();
            if let Some(title) = title.filter(|value| !value.trim().is_empty()) {
                pairs.append_pair("title", title);
            }
            if let Some(year) = year {
                pairs.append_pair("year", &year.to_string());
            }
            if let Some(genre) = genre.filter(|value| !value.trim().is_empty()) {
                pairs.append_pair("genre", genre);
            }
            pairs.append_pair("page", &page.to_string());
        }

        let resp = self.get(url, None)?;
        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Http {
                status: status.as_u16(),
            });
        }
        let envelope: SearchEnvelope =
            decode(resp, "search payload missing data wrapper")?;
        Ok(envelope.data)
    }

    /// GET /movies/data/{imdbID}. Retries exactly once after a fixed backoff
    /// when the server answers 429.
    pub fn movie_details(&self, imdb_id: &str) -> Result<MovieDetail, Error> {
        let url = self.endpoint(&format!("movies/data/{imdb_id}"))?;

        let resp = self.get(url.clone(), None)?;
        let resp = if resp.status().as_u16() == 429 {
            thread::sleep(self.rate_limit_backoff);
            let retried = self.get(url, None)?;
            if retried.status().as_u16() == 429 {
                return Err(Error::RateLimited);
            }
            retried
        } else {
            resp
        };

        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Http {
                status: status.as_u16(),
            });
        }
        decode(resp, "movie detail payload malformed")
    }

    /// GET /people/{id} with a bearer token. A 401 triggers one session
    /// refresh and one retry; a second 401 forces logout.
    pub fn person_details(
        &self,
        id: &str,
        session: &dyn SessionRefresher,
    ) -> Result<PersonDetail, Error> {
        let url = self.endpoint(&format!("people/{id}"))?;
        let token = session.access_token().ok_or(Error::SessionExpired)?;

        let resp = self.get(url.clone(), Some(&token))?;
        let resp = if resp.status().as_u16() == 401 {
            let fresh = session.refresh_access_token()?;
            let retried = self.get(url, Some(&fresh))?;
            if retried.status().as_u16() == 401 {
                session.force_logout();
                return Err(Error::SessionExpired);
            }
            retried
        } else {
            resp
        };

        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Http {
                status: status.as_u16(),
            });
        }
        decode(resp, "person detail payload malformed")
    }

    /// POST /user/register. The server's message body becomes the inline
    /// form error on rejection.
    pub fn register_user(&self, email: &str, password: &str) -> Result<(), Error> {
        let url = self.endpoint("user/register")?;
        let resp = self.post_json(url, &json!({ "email": email, "password": password }))?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(auth_rejection(resp))
        }
    }

    /// POST /user/login.
    pub fn login_user(&self, email: &str, password: &str) -> Result<TokenPair, Error> {
        let url = self.endpoint("user/login")?;
        let resp = self.post_json(url, &json!({ "email": email, "password": password }))?;
        if !resp.status().is_success() {
            return Err(auth_rejection(resp));
        }
        let payload: TokenEnvelope = decode(resp, "login payload malformed")?;
        payload.into_pair()
    }

    /// POST /user/refresh with the refresh token as bearer. 400/401 means
    /// the session is unrecoverable.
    pub fn refresh_session(&self, refresh_token: &str) -> Result<TokenPair, Error> {
        let url = self.endpoint("user/refresh")?;
        let resp = self.post_bearer(url, refresh_token)?;
        let status = resp.status().as_u16();
        if status == 400 || status == 401 {
            return Err(Error::SessionExpired);
        }
        if !resp.status().is_success() {
            return Err(Error::Http { status });
        }
        let payload: TokenEnvelope = decode(resp, "refresh payload malformed")?;
        payload.into_pair()
    }

    /// POST /user/logout. Callers treat failure as best effort.
    pub fn logout(&self, refresh_token: &str) -> Result<(), Error> {
        let url = self.endpoint("user/logout")?;
        let resp = self.post_bearer(url, refresh_token)?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(Error::Http {
                status: resp.status().as_u16(),
            })
        }
    }

    fn endpoint(&self, path: &str) -> Result<Url, Error> {
        self.base_url
            .join(path)
            .map_err(|_| Error::Format("invalid request path"))
    }

    fn get(&self, url: Url, bearer: Option<&str>) -> Result<Response, Error> {
        let mut req = self.http.get(url).header(USER_AGENT, &self.user_agent);
        if let Some(token) = bearer {
            req = req.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        req.send().map_err(Error::Network)
    }

    fn post_json(&self, url: Url, body: &serde_json::Value) -> Result<Response, Error> {
        self.http
            .post(url)
            .header(USER_AGENT, &self.user_agent)
            .header(CONTENT_TYPE, "application/json")
            .json(body)
            .send()
            .map_err(Error::Network)
    }

    fn post_bearer(&self, url: Url, token: &str) -> Result<Response, Error> {
        self.http
            .post(url)
            .header(USER_AGENT, &self.user_agent)
            .header(AUTHORIZATION, format!("Bearer {token}"))
            .send()
            .map_err(Error::Network)
    }
}

fn decode<T: DeserializeOwned>(resp: Response, context: &'static str) -> Result<T, Error> {
    let body = resp.text().map_err(Error::Network)?;
    serde_json::from_str(&body).map_err(|_| Error::Format(context))
}

fn auth_rejection(resp: Response) -> Error {
    let status = resp.status().as_u16();
    let body = resp.text().unwrap_or_default();
    match serde_json::from_str::<RejectionBody>(&body) {
        Ok(rejection) if !rejection.message.is_empty() => Error::Auth {
            message: rejection.message,
        },
        _ => Error::Http { status },
    }
}

#[derive(Debug, Deserialize)]
struct SearchEnvelope {
    data: Vec<MovieStub>,
}

#[derive(Debug, Deserialize)]
struct RejectionBody {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct TokenEnvelope {
    #[serde(default, rename = "bearerToken")]
    bearer_token: Option<TokenBody>,
    #[serde(default, rename = "refreshToken")]
    refresh_token: Option<TokenBody>,
}

#[derive(Debug, Deserialize)]
struct TokenBody {
    #[serde(default)]
    token: String,
    #[serde(default)]
    expires_in: u64,
}

impl TokenEnvelope {
    fn into_pair(self) -> Result<TokenPair, Error> {
        let bearer = self
            .bearer_token
            .filter(|body| !body.token.is_empty())
            .ok_or(Error::Format("token payload missing bearer token"))?;
        let refresh = self
            .refresh_token
            .filter(|body| !body.token.is_empty())
            .ok_or(Error::Format("token payload missing refresh token"))?;
        Ok(TokenPair {
            access_token: bearer.token,
            refresh_token: refresh.token,
            expires_in: bearer.expires_in,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Recorded {
        url: String,
        authorization: Option<String>,
    }

    fn serve(
        responses: Vec<(u16, String)>,
    ) -> (String, thread::JoinHandle<Vec<Recorded>>) {
        let server = tiny_http::Server::http("127.0.0.1:0").expect("bind stub server");
        let base = format!("http://{}/", server.server_addr());
        let handle = thread::spawn(move || {
            let mut seen = Vec::new();
            for (status, body) in responses {
                let request = match server.recv() {
                    Ok(request) => request,
                    Err(_) => break,
                };
                let authorization = request
                    .headers()
                    .iter()
                    .find(|header| header.field.equiv("Authorization"))
                    .map(|header| header.value.as_str().to_string());
                seen.push(Recorded {
                    url: request.url().to_string(),
                    authorization,
                });
                let response =
                    tiny_http::Response::from_string(body).with_status_code(status);
                let _ = request.respond(response);
            }
            seen
        });
        (base, handle)
    }

    fn client(base: String) -> Client {
        Client::new(ClientConfig {
            user_agent: "cinefyra-test/0.1".into(),
            base_url: Some(base),
            http_client: None,
            rate_limit_backoff: Some(Duration::from_millis(5)),
        })
        .unwrap()
    }

    #[test]
    fn search_builds_query_with_only_set_filters() {
        let (base, handle) = serve(vec![(200, r#"{"data":[]}"#.to_string())]);
        let api = client(base);
        let stubs = api
            .search_movies(Some("Matrix"), None, None, 1)
            .expect("search succeeds");
        assert!(stubs.is_empty());
        let seen = handle.join().unwrap();
        assert_eq!(seen[0].url, "/movies/search?title=Matrix&page=1");
    }

    #[test]
    fn search_includes_year_and_genre_when_present() {
        let (base, handle) = serve(vec![(200, r#"{"data":[]}"#.to_string())]);
        let api = client(base);
        api.search_movies(Some("It"), Some(2017), Some("Horror"), 3)
            .unwrap();
        let seen = handle.join().unwrap();
        assert_eq!(
            seen[0].url,
            "/movies/search?title=It&year=2017&genre=Horror&page=3"
        );
    }

    #[test]
    fn search_without_data_wrapper_is_a_format_error() {
        let (base, handle) = serve(vec![(200, r#"{"results":[]}"#.to_string())]);
        let api = client(base);
        let err = api.search_movies(None, None, None, 1).unwrap_err();
        assert!(matches!(err, Error::Format(_)));
        handle.join().unwrap();
    }

    #[test]
    fn movie_details_retries_once_after_rate_limit() {
        let detail = r#"{"title":"The Matrix","year":1999,"genres":["Action"]}"#;
        let (base, handle) = serve(vec![
            (429, String::new()),
            (200, detail.to_string()),
        ]);
        let api = client(base);
        let detail = api.movie_details("tt0133093").expect("retry succeeds");
        assert_eq!(detail.title, "The Matrix");
        let seen = handle.join().unwrap();
        assert_eq!(seen.len(), 2, "expected exactly one retry");
        assert_eq!(seen[0].url, "/movies/data/tt0133093");
        assert_eq!(seen[1].url, "/movies/data/tt0133093");
    }

    #[test]
    fn movie_details_gives_up_after_second_rate_limit() {
        let (base, handle) = serve(vec![(429, String::new()), (429, String::new())]);
        let api = client(base);
        let err = api.movie_details("tt1").unwrap_err();
        assert!(matches!(err, Error::RateLimited));
        assert_eq!(handle.join().unwrap().len(), 2);
    }

    #[test]
    fn login_rejection_surfaces_server_message() {
        let (base, handle) = serve(vec![(
            401,
            r#"{"message":"Incorrect email or password"}"#.to_string(),
        )]);
        let api = client(base);
        let err = api.login_user("user@example.com", "nope").unwrap_err();
        match err {
            Error::Auth { message } => assert_eq!(message, "Incorrect email or password"),
            other => panic!("expected auth error, got {other:?}"),
        }
        handle.join().unwrap();
    }

    #[test]
    fn login_decodes_token_pair() {
        let body = r#"{"bearerToken":{"token":"aaa","expires_in":600},"refreshToken":{"token":"bbb"}}"#;
        let (base, handle) = serve(vec![(200, body.to_string())]);
        let api = client(base);
        let pair = api.login_user("user@example.com", "pw").unwrap();
        assert_eq!(pair.access_token, "aaa");
        assert_eq!(pair.refresh_token, "bbb");
        assert_eq!(pair.expires_in, 600);
        handle.join().unwrap();
    }

    #[test]
    fn refresh_with_rejected_token_is_session_expired() {
        let (base, handle) = serve(vec![(401, String::new())]);
        let api = client(base);
        let err = api.refresh_session("stale").unwrap_err();
        assert!(matches!(err, Error::SessionExpired));
        handle.join().unwrap();
    }

    struct StubRefresher {
        refreshes: AtomicUsize,
        logged_out: AtomicBool,
        refreshed_token: Mutex<Option<String>>,
    }

    impl StubRefresher {
        fn new(refreshed_token: Option<&str>) -> Arc<Self> {
            Arc::new(Self {
                refreshes: AtomicUsize::new(0),
                logged_out: AtomicBool::new(false),
                refreshed_token: Mutex::new(refreshed_token.map(str::to_string)),
            })
        }
    }

    impl SessionRefresher for StubRefresher {
        fn access_token(&self) -> Option<String> {
            Some("stale-token".to_string())
        }

        fn refresh_access_token(&self) -> Result<String, Error> {
            self.refreshes.fetch_add(1, Ordering::SeqCst);
            match self.refreshed_token.lock().clone() {
                Some(token) => Ok(token),
                None => Err(Error::SessionExpired),
            }
        }

        fn force_logout(&self) {
            self.logged_out.store(true, Ordering::SeqCst);
        }
    }

    #[test]
    fn person_details_refreshes_once_then_retries() {
        let person = r#"{"name":"Keanu Reeves","birthYear":1964}"#;
        let (base, handle) = serve(vec![
            (401, String::new()),
            (200, person.to_string()),
        ]);
        let api = client(base);
        let refresher = StubRefresher::new(Some("fresh-token"));
        let person = api
            .person_details("nm0000206", refresher.as_ref())
            .expect("retry with refreshed token succeeds");
        assert_eq!(person.name, "Keanu Reeves");
        assert_eq!(refresher.refreshes.load(Ordering::SeqCst), 1);
        let seen = handle.join().unwrap();
        assert_eq!(
            seen[0].authorization.as_deref(),
            Some("Bearer stale-token")
        );
        assert_eq!(
            seen[1].authorization.as_deref(),
            Some("Bearer fresh-token")
        );
    }

    #[test]
    fn person_details_forces_logout_on_second_unauthorized() {
        let (base, handle) = serve(vec![(401, String::new()), (401, String::new())]);
        let api = client(base);
        let refresher = StubRefresher::new(Some("fresh-token"));
        let err = api
            .person_details("nm0000206", refresher.as_ref())
            .unwrap_err();
        assert!(matches!(err, Error::SessionExpired));
        assert!(refresher.logged_out.load(Ordering::SeqCst));
        handle.join().unwrap();
    }

    #[test]
    fn person_details_propagates_failed_refresh() {
        let (base, handle) = serve(vec![(401, String::new())]);
        let api = client(base);
        let refresher = StubRefresher::new(None);
        let err = api.person_details("nm1", refresher.as_ref()).unwrap_err();
        assert!(matches!(err, Error::SessionExpired));
        assert_eq!(refresher.refreshes.load(Ordering::SeqCst), 1);
        handle.join().unwrap();
    }
}
