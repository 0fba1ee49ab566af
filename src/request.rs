// src/request.rs

use futures_util::stream;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, COOKIE, RANGE, USER_AGENT};
use reqwest::{Body, Client, Method, RequestBuilder};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RequestError {
    #[error("header line {0:?} is not of the form \"Name: value\"")]
    MalformedHeader(String),
    #[error("invalid header name in {line:?}: {source}")]
    InvalidName {
        line: String,
        source: reqwest::header::InvalidHeaderName,
    },
    #[error("invalid header value in {line:?}: {source}")]
    InvalidValue {
        line: String,
        source: reqwest::header::InvalidHeaderValue,
    },
    #[error("invalid method: {0}")]
    InvalidMethod(String),
}

/// Everything the caller wants on every request besides the URL and range.
///
/// Headers are validated once here; every probe and chunk request is then
/// stamped from the same template.
#[derive(Debug, Clone)]
pub struct RequestTemplate {
    method: Method,
    headers: HeaderMap,
    body: Option<Vec<u8>>,
}

impl Default for RequestTemplate {
    fn default() -> Self {
        Self {
            method: Method::GET,
            headers: HeaderMap::new(),
            body: None,
        }
    }
}

impl RequestTemplate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn method(mut self, method: &str) -> Result<Self, RequestError> {
        self.method = Method::from_bytes(method.as_bytes())
            .map_err(|_| RequestError::InvalidMethod(method.to_string()))?;
        Ok(self)
    }

    /// Adds `"Name: value"` lines. Repeated names are appended, not replaced.
    pub fn headers<I, S>(mut self, lines: I) -> Result<Self, RequestError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for line in lines {
            let line = line.as_ref();
            let (name, value) = parse_header_line(line)?;
            self.headers.append(name, value);
        }
        Ok(self)
    }

    /// Adds a `Cookie` header; empty strings are ignored.
    pub fn cookie(mut self, cookie: &str) -> Result<Self, RequestError> {
        if !cookie.is_empty() {
            let value = HeaderValue::from_str(cookie).map_err(|source| RequestError::InvalidValue {
                line: format!("Cookie: {cookie}"),
                source,
            })?;
            self.headers.append(COOKIE, value);
        }
        Ok(self)
    }

    /// Replaces any `User-Agent`; empty strings are ignored.
    pub fn user_agent(mut self, user_agent: &str) -> Result<Self, RequestError> {
        if !user_agent.is_empty() {
            let value =
                HeaderValue::from_str(user_agent).map_err(|source| RequestError::InvalidValue {
                    line: format!("User-Agent: {user_agent}"),
                    source,
                })?;
            self.headers.insert(USER_AGENT, value);
        }
        Ok(self)
    }

    /// Attaches a request body; an empty body is ignored.
    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        let body = body.into();
        self.body = (!body.is_empty()).then_some(body);
        self
    }

    pub fn header_map(&self) -> &HeaderMap {
        &self.headers
    }

    /// Stamps a request for `url`, optionally constrained to `range`
    /// (a full `bytes=...` header value).
    pub fn build(&self, client: &Client, url: &str, range: Option<&str>) -> RequestBuilder {
        let mut rb = client
            .request(self.method.clone(), url)
            .headers(self.headers.clone());
        if let Some(range) = range {
            rb = rb.header(RANGE, range);
        }
        if let Some(body) = &self.body {
            // Streamed so the body is sent without a known length.
            let chunk: Result<Vec<u8>, std::io::Error> = Ok(body.clone());
            rb = rb.body(Body::wrap_stream(stream::iter([chunk])));
        }
        rb
    }
}

fn parse_header_line(line: &str) -> Result<(HeaderName, HeaderValue), RequestError> {
    let (name, value) = line
        .split_once(':')
        .ok_or_else(|| RequestError::MalformedHeader(line.to_string()))?;
    let name = HeaderName::from_bytes(name.trim().as_bytes()).map_err(|source| {
        RequestError::InvalidName {
            line: line.to_string(),
            source,
        }
    })?;
    let value = HeaderValue::from_str(value.trim()).map_err(|source| RequestError::InvalidValue {
        line: line.to_string(),
        source,
    })?;
    Ok((name, value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_headers_are_appended() {
        let template = RequestTemplate::new()
            .headers(["Accept: text/html", "Accept:  application/json ", "X-Token: a:b"])
            .unwrap();
        let values: Vec<_> = template.header_map().get_all("accept").iter().collect();
        assert_eq!(values, ["text/html", "application/json"]);
        assert_eq!(template.header_map()["x-token"], "a:b");
    }

    #[test]
    fn user_agent_replaces_header_line() {
        let template = RequestTemplate::new()
            .headers(["User-Agent: curl/8"])
            .unwrap()
            .user_agent("tget")
            .unwrap();
        let values: Vec<_> = template.header_map().get_all(USER_AGENT).iter().collect();
        assert_eq!(values, ["tget"]);
    }

    #[test]
    fn empty_cookie_and_agent_are_skipped() {
        let template = RequestTemplate::new()
            .cookie("")
            .unwrap()
            .user_agent("")
            .unwrap()
            .body(Vec::new());
        assert!(template.header_map().is_empty());
        assert!(template.body.is_none());
    }

    #[test]
    fn cookie_is_sent_as_header() {
        let template = RequestTemplate::new().cookie("session=42").unwrap();
        assert_eq!(template.header_map()[COOKIE], "session=42");
    }

    #[test]
    fn line_without_colon_is_rejected() {
        let err = RequestTemplate::new().headers(["NoColonHere"]).unwrap_err();
        assert!(matches!(err, RequestError::MalformedHeader(_)));
    }

    #[test]
    fn custom_method() {
        let template = RequestTemplate::new().method("POST").unwrap();
        assert_eq!(template.method, Method::POST);
        assert!(RequestTemplate::new().method("BAD METHOD").is_err());
    }
}
