//! Incoming response model.

use serde::de::DeserializeOwned;

/// One HTTP response, fully buffered.
///
/// The executor returns responses of any status; interpreting non-2xx bodies
/// is the caller's job.
#[derive(Debug, Clone)]
pub struct Response {
    pub status: u16,
    headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Response {
    pub fn new(status: u16, headers: Vec<(String, String)>, body: Vec<u8>) -> Self {
        Self { status, headers, body }
    }

    /// Whether the status code is in the 2xx range.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Whether the status code signals a server-side failure (5xx).
    pub fn is_server_error(&self) -> bool {
        (500..600).contains(&self.status)
    }

    /// Get the first value of a header, if present (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Body as UTF-8, lossily converted.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Deserialize the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for the response model.
    use serde::Deserialize;

    use super::*;

    #[test]
    fn status_classification() {
        assert!(Response::new(200, vec![], vec![]).is_success());
        assert!(Response::new(204, vec![], vec![]).is_success());
        assert!(!Response::new(401, vec![], vec![]).is_success());
        assert!(Response::new(503, vec![], vec![]).is_server_error());
        assert!(!Response::new(404, vec![], vec![]).is_server_error());
    }

    #[test]
    fn header_lookup_is_case_insensitive() {
        let response =
            Response::new(200, vec![("Content-Type".into(), "application/json".into())], vec![]);
        assert_eq!(response.header("content-type"), Some("application/json"));
        assert_eq!(response.header("x-missing"), None);
    }

    #[test]
    fn json_body_deserializes() {
        #[derive(Deserialize)]
        struct Payload {
            value: u32,
        }

        let response = Response::new(200, vec![], br#"{"value": 7}"#.to_vec());
        let payload: Payload = response.json().expect("valid JSON body");
        assert_eq!(payload.value, 7);

        let bad = Response::new(200, vec![], b"not json".to_vec());
        assert!(bad.json::<Payload>().is_err());
    }
}
