//! Blocking JSON-over-HTTP plumbing shared by the GitHub and Heroku clients.
//!
//! Status codes are never turned into transport errors by the agent; every
//! non-2xx answer becomes a [`RequestError`] of kind `Status` carrying the body,
//! and a body that does not parse becomes `Malformed`.

use crate::error::{Error, Result};
use convergence::RequestError;
use log::debug;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use url::Url;

/// HTTP verbs the clients use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        };
        f.write_str(verb)
    }
}

/// How a list endpoint hands out further pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Paging {
    /// `Link: <...>; rel="next"` (GitHub)
    Link,
    /// `206 Partial Content` with a `Next-Range` header to echo back as `Range` (Heroku)
    Range,
}

/// A completed exchange.
#[derive(Debug, Clone)]
pub struct Reply {
    /// `METHOD /path` of the request, used as error context.
    pub context: String,
    pub status: u16,
    /// Raw `Link` header.
    pub link: Option<String>,
    /// Raw `Next-Range` header.
    pub next_range: Option<String>,
    pub body: String,
}

impl Reply {
    /// Whether the status is 2xx.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Turn a non-2xx reply into a `Status` error.
    pub fn success(self) -> std::result::Result<Self, RequestError> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(RequestError::status(self.context, self.status, self.body))
        }
    }

    /// Parse the body.
    pub fn json<T: DeserializeOwned>(&self) -> std::result::Result<T, RequestError> {
        serde_json::from_str(&self.body)
            .map_err(|e| RequestError::malformed(self.context.clone(), e.to_string()))
    }
}

/// JSON API client bound to one base URL and a fixed header set.
#[derive(Clone)]
pub struct HttpClient {
    agent: ureq::Agent,
    base: Url,
    headers: Vec<(&'static str, String)>,
}

impl fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Headers carry the bearer token
        f.debug_struct("HttpClient")
            .field("base", &self.base.as_str())
            .finish_non_exhaustive()
    }
}

impl HttpClient {
    /// Create a client for `api_base` that sends `headers` on every request.
    pub fn new(api_base: &str, headers: Vec<(&'static str, String)>) -> Result<Self> {
        let invalid = |message: String| Error::InvalidBaseUrl {
            url: api_base.to_string(),
            message,
        };

        let base = Url::parse(api_base).map_err(|e| invalid(e.to_string()))?;
        if base.cannot_be_a_base() || !matches!(base.scheme(), "http" | "https") {
            return Err(invalid("expected an http(s) URL".to_string()));
        }

        let config = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .build();

        Ok(Self {
            agent: ureq::Agent::new_with_config(config),
            base,
            headers,
        })
    }

    /// Build a URL under the base, encoding each segment on its own.
    ///
    /// Segments are never split, so `a/b` as one segment becomes `a%2Fb`.
    pub fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// Issue one request.
    pub fn send(
        &self,
        method: Method,
        url: &Url,
        body: Option<&Value>,
    ) -> std::result::Result<Reply, RequestError> {
        self.execute(method, url, body, None)
    }

    /// Issue a request and require a 2xx answer.
    pub fn send_checked(
        &self,
        method: Method,
        url: &Url,
        body: Option<&Value>,
    ) -> std::result::Result<Reply, RequestError> {
        self.send(method, url, body)?.success()
    }

    /// GET a single document, `Ok(None)` on 404.
    pub fn get_optional<T: DeserializeOwned>(
        &self,
        url: &Url,
    ) -> std::result::Result<Option<T>, RequestError> {
        let reply = self.send(Method::Get, url, None)?;
        if reply.status == 404 {
            return Ok(None);
        }
        reply.success()?.json().map(Some)
    }

    /// GET every page of a list endpoint.
    pub fn get_all<T: DeserializeOwned>(
        &self,
        url: Url,
        paging: Paging,
    ) -> std::result::Result<Vec<T>, RequestError> {
        let mut items = Vec::new();
        let mut next = Some(url);
        let mut range: Option<String> = None;

        while let Some(url) = next.take() {
            let reply = self.execute(Method::Get, &url, None, range.as_deref())?.success()?;
            let page: Vec<T> = reply.json()?;
            items.extend(page);

            match paging {
                Paging::Link => {
                    next = match reply.link.as_deref().and_then(next_link) {
                        Some(link) => Some(
                            Url::parse(&link)
                                .map_err(|e| RequestError::malformed(&reply.context, e.to_string()))?,
                        ),
                        None => None,
                    };
                }
                Paging::Range => {
                    if reply.status == 206
                        && let Some(next_range) = reply.next_range
                    {
                        range = Some(next_range);
                        next = Some(url);
                    }
                }
            }
        }

        Ok(items)
    }

    fn execute(
        &self,
        method: Method,
        url: &Url,
        body: Option<&Value>,
        range: Option<&str>,
    ) -> std::result::Result<Reply, RequestError> {
        let context = format!("{method} {}", url.path());
        debug!("{context}");

        let target = url.as_str();
        let result = match (method, body) {
            (Method::Get, _) => {
                let mut request = self.prepare(self.agent.get(target));
                if let Some(range) = range {
                    request = request.header("Range", range);
                }
                request.call()
            }
            (Method::Delete, _) => self.prepare(self.agent.delete(target)).call(),
            (Method::Post, Some(body)) => self.prepare(self.agent.post(target)).send_json(body),
            (Method::Post, None) => self.prepare(self.agent.post(target)).send_empty(),
            (Method::Put, Some(body)) => self.prepare(self.agent.put(target)).send_json(body),
            (Method::Put, None) => self.prepare(self.agent.put(target)).send_empty(),
            (Method::Patch, Some(body)) => self.prepare(self.agent.patch(target)).send_json(body),
            (Method::Patch, None) => self.prepare(self.agent.patch(target)).send_empty(),
        };

        let mut response = result.map_err(|e| RequestError::transport(&context, e.to_string()))?;

        let status = response.status().as_u16();
        let link = header(&response, "link");
        let next_range = header(&response, "next-range");
        let body = response
            .body_mut()
            .read_to_string()
            .map_err(|e| RequestError::transport(&context, e.to_string()))?;

        debug!("{context} -> {status}");
        Ok(Reply {
            context,
            status,
            link,
            next_range,
            body,
        })
    }

    fn prepare<B>(&self, mut request: ureq::RequestBuilder<B>) -> ureq::RequestBuilder<B> {
        for (name, value) in &self.headers {
            request = request.header(*name, value.as_str());
        }
        request
    }
}

fn header(response: &ureq::http::Response<ureq::Body>, name: &str) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

/// Extract the `rel="next"` target from a `Link` header.
pub fn next_link(header: &str) -> Option<String> {
    header.split(',').find_map(|part| {
        let mut pieces = part.split(';');
        let target = pieces.next()?.trim();
        let is_next = pieces.any(|param| {
            let param = param.trim();
            param == r#"rel="next""# || param == "rel=next"
        });
        if !is_next {
            return None;
        }
        target
            .strip_prefix('<')
            .and_then(|t| t.strip_suffix('>'))
            .map(str::to_string)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Write};
    use std::net::TcpListener;
    use std::thread::{self, JoinHandle};

    fn client(base: &str) -> HttpClient {
        HttpClient::new(base, vec![("Accept", "application/json".into())]).unwrap()
    }

    /// Local listener and its base URL
    fn listener() -> (TcpListener, String) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        (listener, base)
    }

    /// Answer one connection per reply, in order, returning each request head
    fn serve(listener: TcpListener, replies: Vec<String>) -> JoinHandle<Vec<String>> {
        thread::spawn(move || {
            let mut heads = Vec::new();
            for reply in replies {
                let (stream, _) = listener.accept().unwrap();
                let mut reader = BufReader::new(stream.try_clone().unwrap());
                let mut head = String::new();
                loop {
                    let mut line = String::new();
                    if reader.read_line(&mut line).unwrap() == 0 || line == "\r\n" {
                        break;
                    }
                    head.push_str(&line);
                }
                heads.push(head);
                let mut stream = stream;
                stream.write_all(reply.as_bytes()).unwrap();
                stream.flush().unwrap();
            }
            heads
        })
    }

    fn reply(status: &str, headers: &[(&str, &str)], body: &str) -> String {
        let extra: String = headers
            .iter()
            .map(|(name, value)| format!("{name}: {value}\r\n"))
            .collect();
        format!(
            "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n{extra}\r\n{body}",
            body.len()
        )
    }

    #[test]
    fn test_get_all_follows_link_pages() {
        let (listener, base) = listener();
        let next = format!(r#"<{base}/items?page=2>; rel="next""#);
        let server = serve(
            listener,
            vec![
                reply("200 OK", &[("Link", &next)], r#"["a","b"]"#),
                reply("200 OK", &[], r#"["c"]"#),
            ],
        );

        let http = client(&base);
        let items: Vec<String> = http.get_all(http.url(&["items"]), Paging::Link).unwrap();
        assert_eq!(items, vec!["a", "b", "c"]);

        let heads = server.join().unwrap();
        assert!(heads[0].starts_with("GET /items "));
        assert!(heads[1].starts_with("GET /items?page=2 "));
    }

    #[test]
    fn test_get_all_echoes_next_range() {
        let (listener, base) = listener();
        let server = serve(
            listener,
            vec![
                reply(
                    "206 Partial Content",
                    &[("Next-Range", "id ]abc..; max=2")],
                    r#"["a","abc"]"#,
                ),
                reply("200 OK", &[], r#"["b"]"#),
            ],
        );

        let http = client(&base);
        let items: Vec<String> = http.get_all(http.url(&["items"]), Paging::Range).unwrap();
        assert_eq!(items, vec!["a", "abc", "b"]);

        let heads = server.join().unwrap();
        assert_eq!(heads.len(), 2);
        assert!(!heads[0].to_ascii_lowercase().contains("range:"));
        assert!(heads[1].to_ascii_lowercase().contains("range: id ]abc..; max=2"));
    }

    #[test]
    fn test_get_all_error_on_later_page_returns_no_items() {
        let (listener, base) = listener();
        let server = serve(
            listener,
            vec![
                reply(
                    "206 Partial Content",
                    &[("Next-Range", "id ]abc..; max=2")],
                    r#"["a","abc"]"#,
                ),
                reply("500 Internal Server Error", &[], r#"{"message":"boom"}"#),
            ],
        );

        let http = client(&base);
        let err = http
            .get_all::<String>(http.url(&["items"]), Paging::Range)
            .unwrap_err();
        assert_eq!(err.kind, convergence::RequestErrorKind::Status);
        assert_eq!(err.status, Some(500));
        assert!(err.body.contains("boom"));

        server.join().unwrap();
    }

    #[test]
    fn test_url_joins_segments() {
        let http = client("https://api.github.com");
        assert_eq!(
            http.url(&["orgs", "acme", "teams"]).as_str(),
            "https://api.github.com/orgs/acme/teams"
        );
    }

    #[test]
    fn test_url_keeps_base_path() {
        let http = client("https://ghe.example.com/api/v3/");
        assert_eq!(
            http.url(&["repos", "acme", "web", "hooks"]).as_str(),
            "https://ghe.example.com/api/v3/repos/acme/web/hooks"
        );
    }

    #[test]
    fn test_url_encodes_within_segment() {
        let http = client("https://api.heroku.com");
        let url = http.url(&["apps", "web", "collaborators", "a b/c"]);
        assert_eq!(url.path(), "/apps/web/collaborators/a%20b%2Fc");
    }

    #[test]
    fn test_rejects_unusable_base() {
        assert!(HttpClient::new("not a url", vec![]).is_err());
        assert!(HttpClient::new("mailto:ops@example.com", vec![]).is_err());
        assert!(HttpClient::new("ftp://example.com", vec![]).is_err());
    }

    #[test]
    fn test_next_link_found() {
        let header = r#"<https://api.github.com/orgs/acme/teams?page=2>; rel="next", <https://api.github.com/orgs/acme/teams?page=5>; rel="last""#;
        assert_eq!(
            next_link(header).as_deref(),
            Some("https://api.github.com/orgs/acme/teams?page=2")
        );
    }

    #[test]
    fn test_next_link_absent_on_last_page() {
        let header = r#"<https://api.github.com/orgs/acme/teams?page=1>; rel="first", <https://api.github.com/orgs/acme/teams?page=4>; rel="prev""#;
        assert_eq!(next_link(header), None);
    }

    #[test]
    fn test_reply_status_error_keeps_body() {
        let reply = Reply {
            context: "PUT /teams/1/memberships/alice".into(),
            status: 422,
            link: None,
            next_range: None,
            body: r#"{"message":"Validation Failed"}"#.into(),
        };
        let err = reply.success().unwrap_err();
        assert_eq!(err.status, Some(422));
        assert!(err.body.contains("Validation Failed"));
    }

    #[test]
    fn test_reply_malformed_body() {
        let reply = Reply {
            context: "GET /apps/web".into(),
            status: 200,
            link: None,
            next_range: None,
            body: "<html>".into(),
        };
        let err = reply.json::<Value>().unwrap_err();
        assert_eq!(err.kind, convergence::RequestErrorKind::Malformed);
    }

    #[test]
    fn test_debug_hides_headers() {
        let http = HttpClient::new(
            "https://api.github.com",
            vec![("Authorization", "Bearer secret".into())],
        )
        .unwrap();
        assert!(!format!("{http:?}").contains("secret"));
    }
}
