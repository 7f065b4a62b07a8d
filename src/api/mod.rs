pub mod endpoint;
pub mod error;
pub mod series;

use chrono::NaiveDate;
use lazy_static::lazy_static;
use regex::Regex;
use reqwest::cookie::{CookieStore, Jar};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::model::{Account, LoggedInAccount};
pub use error::{Error, Stage};

/* The login form embeds a per-page anti-forgery value in a hidden field;
 * it has to be echoed back in the submission. */
const CSRF_TOKEN_PATTERN: &str = r#"_csrf_token" value="(.*)" />"#;

/* Only cookie the portal sets on a successful login. */
const AUTH_COOKIE: &str = "eZSESSID";

lazy_static! {
    static ref CSRF_TOKEN_RE: Regex = Regex::new(CSRF_TOKEN_PATTERN).unwrap();
}

fn extract_csrf_token(body: &str) -> Result<String, Error> {
    CSRF_TOKEN_RE
        .captures(body)
        .and_then(|captures| captures.get(1))
        .map(|token| String::from(token.as_str()))
        .ok_or(Error::TokenNotFound)
}

async fn csrf_token(client: &reqwest::Client, base_url: &str) -> Result<String, Error> {
    let url = format!("{}{}", base_url, endpoint::LOGIN);
    log::debug!("acquiring CSRF token from {}", url);

    client
        .get(url)
        .send()
        .await
        .map_err(|e| Error::LoginSubmission(e.to_string()))?
        .text()
        .await
        .map_err(|e| Error::LoginSubmission(e.to_string()))
        .and_then(|body| extract_csrf_token(&body))
}

/* The portal has gone through several namings of the credential fields;
 * submitting every variant at once keeps the form compatible with all of
 * them. `signin[password]` is intentionally absent: the portal never read
 * it and existing integrations leave it out of the encoded form. */
fn login_form<'a>(account: &'a Account, token: &'a str) -> HashMap<&'static str, &'a str> {
    HashMap::from([
        ("_username", account.username.as_str()),
        ("_password", account.password.as_str()),
        ("_csrf_token", token),
        ("signin[username]", account.username.as_str()),
        ("tsme_user_login[_username]", account.username.as_str()),
        ("tsme_user_login[_password]", account.password.as_str()),
    ])
}

/// Whether the session cookie is present in the jar, wherever in the login
/// exchange it was granted.
fn has_session_cookie(jar: &Jar, base_url: &str) -> bool {
    let marker = format!("{}=", AUTH_COOKIE);

    reqwest::Url::parse(base_url)
        .ok()
        .and_then(|url| jar.cookies(&url))
        .and_then(|header| header.to_str().map(String::from).ok())
        .map_or(false, |cookies| {
            cookies
                .split(';')
                .any(|cookie| cookie.trim_start().starts_with(&marker))
        })
}

/// Establish an authenticated session: scrape the CSRF token off the login
/// page, then submit the login form with redirects disabled. Success is
/// indicated solely by the `eZSESSID` cookie sitting in the cookie jar
/// afterwards — the portal may grant it on the login-page GET or on the
/// POST itself.
pub async fn login(account: &Account) -> Result<LoggedInAccount, Error> {
    let jar = Arc::new(Jar::default());
    let mut builder = reqwest::ClientBuilder::new()
        .cookie_provider(Arc::clone(&jar))
        .redirect(reqwest::redirect::Policy::none());
    if let Some(timeout) = account.timeout {
        builder = builder.timeout(timeout);
    }
    let client = builder.build().or(Err(Error::InternalError))?;

    let token = csrf_token(&client, &account.base_url).await?;
    let url = format!("{}{}", account.base_url, endpoint::LOGIN);

    log::debug!("submitting login form for {}", account.username);
    let response = client
        .post(url)
        .form(&login_form(account, &token))
        .send()
        .await
        .map_err(|e| Error::LoginSubmission(e.to_string()))?;

    let granted = has_session_cookie(&jar, &account.base_url);
    if granted {
        Ok(LoggedInAccount {
            base_url: account.base_url.to_owned(),
            counter_id: account.counter_id.to_owned(),
            client,
        })
    } else {
        log::warn!(
            "no {} cookie granted (server responded {})",
            AUTH_COOKIE,
            response.status()
        );
        Err(Error::InvalidCredentials)
    }
}

/// Map a non-success status from a data endpoint to an error.
fn map_status_err(status: http::StatusCode, url: &str) -> Error {
    match status {
        http::StatusCode::UNAUTHORIZED | http::StatusCode::FORBIDDEN => {
            Error::Http(format!("{} denied access ({})", url, status))
        }
        _ => Error::Http(format!("{} responded with {}", url, status)),
    }
}

async fn fetch_series(
    session: &LoggedInAccount,
    url: &str,
    stage: Stage,
) -> Result<Vec<Value>, Error> {
    log::debug!("fetching {} series from {}", stage, url);

    let response = session
        .client
        .get(url)
        .send()
        .await
        .map_err(|e| Error::Http(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        return Err(map_status_err(status, url));
    }

    response
        .text()
        .await
        .map_err(|e| Error::Http(format!("error reading response from {}: {}", url, e)))
        .and_then(|body| {
            /* An expired or missing session gets an HTML error page with a
             * 200 status; it surfaces here as an unparseable series. */
            serde_json::from_str::<Vec<Value>>(&body)
                .map_err(|e| Error::Data(stage, format!("unparseable series: {}", e)))
        })
}

/// Daily series for the month of `date`. Requires an authenticated session.
pub async fn month_data(
    session: &LoggedInAccount,
    date: NaiveDate,
    stage: Stage,
) -> Result<Vec<Value>, Error> {
    let url = format!(
        "{}{}/{}/{}/{}",
        session.base_url,
        endpoint::DAILY_DATA,
        date.format("%Y"),
        date.format("%m"),
        session.counter_id
    );

    fetch_series(session, &url, stage).await
}

/// Full per-month history plus the three trailing aggregates.
pub async fn history_data(session: &LoggedInAccount) -> Result<Vec<Value>, Error> {
    let url = format!(
        "{}{}/{}",
        session.base_url,
        endpoint::HISTORY_DATA,
        session.counter_id
    );

    fetch_series(session, &url, Stage::History).await
}

#[cfg(test)]
mod test {
    use super::*;
    use std::fs;
    use std::path::PathBuf;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn read_resource(filename: &str) -> String {
        let mut d = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
        d.push(format!("resources/test/{}", filename));
        fs::read_to_string(d.as_path()).unwrap()
    }

    fn http_response(status: &str, extra_headers: &[&str], body: &str) -> String {
        let mut response = format!(
            "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n",
            status,
            body.len()
        );
        for header in extra_headers {
            response.push_str(header);
            response.push_str("\r\n");
        }
        response.push_str("\r\n");
        response.push_str(body);
        response
    }

    /// Serve one canned response per incoming connection, in order, on an
    /// ephemeral local port. Returns the base URL to point the client at.
    async fn serve_responses(responses: Vec<String>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            for response in responses {
                let (mut socket, _) = listener.accept().await.unwrap();
                let mut request = Vec::new();
                let mut chunk = [0u8; 1024];
                loop {
                    let n = socket.read(&mut chunk).await.unwrap();
                    if n == 0 {
                        break;
                    }
                    request.extend_from_slice(&chunk[..n]);
                    let head_end = request.windows(4).position(|w| w == b"\r\n\r\n");
                    if let Some(pos) = head_end {
                        let head = String::from_utf8_lossy(&request[..pos]).to_lowercase();
                        let content_length = head
                            .lines()
                            .find_map(|line| line.strip_prefix("content-length:"))
                            .and_then(|v| v.trim().parse::<usize>().ok())
                            .unwrap_or(0);
                        while request.len() < pos + 4 + content_length {
                            let n = socket.read(&mut chunk).await.unwrap();
                            if n == 0 {
                                break;
                            }
                            request.extend_from_slice(&chunk[..n]);
                        }
                        break;
                    }
                }
                socket.write_all(response.as_bytes()).await.unwrap();
                socket.shutdown().await.ok();
            }
        });

        format!("http://{}", addr)
    }

    fn test_account(base_url: String) -> Account {
        Account {
            base_url,
            username: "user@example.com".to_string(),
            password: "hunter2".to_string(),
            counter_id: "123456".to_string(),
            timeout: None,
        }
    }

    const LOGIN_PAGE: &str = r#"<input name="_csrf_token" value="abc123" />"#;

    #[test]
    fn token_is_scraped_from_the_login_page() {
        let body = read_resource("login_page.html");
        assert_eq!("abc123", extract_csrf_token(&body).unwrap());
    }

    #[test]
    fn token_is_scraped_from_a_bare_marker() {
        let body = r#"<input name="_csrf_token" value="s3cr3t" />"#;
        assert_eq!("s3cr3t", extract_csrf_token(body).unwrap());
    }

    #[test]
    fn missing_marker_is_a_token_error() {
        assert_eq!(
            Err(Error::TokenNotFound),
            extract_csrf_token("<html><body>maintenance</body></html>")
        );
    }

    #[test]
    fn login_form_submits_every_field_variant_but_no_signin_password() {
        let account = test_account("https://www.toutsurmoneau.fr".to_string());
        let form = login_form(&account, "abc123");

        assert_eq!(Some(&"user@example.com"), form.get("_username"));
        assert_eq!(Some(&"hunter2"), form.get("_password"));
        assert_eq!(Some(&"abc123"), form.get("_csrf_token"));
        assert_eq!(Some(&"user@example.com"), form.get("signin[username]"));
        assert_eq!(
            Some(&"user@example.com"),
            form.get("tsme_user_login[_username]")
        );
        assert_eq!(Some(&"hunter2"), form.get("tsme_user_login[_password]"));
        assert!(!form.contains_key("signin[password]"));
    }

    #[test]
    fn session_cookie_is_looked_up_in_the_jar() {
        let base_url = "https://www.toutsurmoneau.fr";
        let url = base_url.parse().unwrap();
        let jar = Jar::default();

        jar.add_cookie_str("other=1; Path=/", &url);
        assert!(!has_session_cookie(&jar, base_url));

        jar.add_cookie_str("eZSESSID=xyz; Path=/", &url);
        assert!(has_session_cookie(&jar, base_url));
    }

    #[tokio::test]
    async fn login_grants_a_session_from_the_post_cookie() {
        let base_url = serve_responses(vec![
            http_response("200 OK", &[], LOGIN_PAGE),
            http_response("302 Found", &["Set-Cookie: eZSESSID=xyz; Path=/"], ""),
        ])
        .await;

        let session = login(&test_account(base_url.clone())).await.unwrap();
        assert_eq!(base_url, session.base_url);
        assert_eq!("123456", session.counter_id);
    }

    #[tokio::test]
    async fn login_accepts_a_session_cookie_granted_before_the_post() {
        /* The portal sometimes starts the session on the login-page GET and
         * the POST redirects without re-setting the cookie. */
        let base_url = serve_responses(vec![
            http_response("200 OK", &["Set-Cookie: eZSESSID=early; Path=/"], LOGIN_PAGE),
            http_response("302 Found", &[], ""),
        ])
        .await;

        assert!(login(&test_account(base_url)).await.is_ok());
    }

    #[tokio::test]
    async fn login_without_session_cookie_is_invalid_credentials() {
        let base_url = serve_responses(vec![
            http_response("200 OK", &[], LOGIN_PAGE),
            http_response("302 Found", &["Set-Cookie: other=1; Path=/"], ""),
        ])
        .await;

        match login(&test_account(base_url)).await.unwrap_err() {
            Error::InvalidCredentials => {}
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn server_error_status_aborts_a_fetch() {
        let base_url = serve_responses(vec![http_response(
            "500 Internal Server Error",
            &[],
            "boom",
        )])
        .await;

        let session = LoggedInAccount {
            base_url,
            counter_id: "123456".to_string(),
            client: reqwest::Client::new(),
        };

        match history_data(&session).await.unwrap_err() {
            Error::Http(detail) => assert!(detail.contains("500"), "{}", detail),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn error_page_instead_of_json_is_a_stage_data_error() {
        let base_url = serve_responses(vec![http_response(
            "200 OK",
            &[],
            "<html>session expired</html>",
        )])
        .await;

        let session = LoggedInAccount {
            base_url,
            counter_id: "123456".to_string(),
            client: reqwest::Client::new(),
        };

        match history_data(&session).await.unwrap_err() {
            Error::Data(Stage::History, _) => {}
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
