use std::collections::HashMap;

use url::form_urlencoded;

use super::decode_hex_body;

/// Decodes a hex encoded `application/x-www-form-urlencoded` body.
///
/// Invalid UTF-8 is replaced rather than rejected, and invalid hex decodes as
/// an empty body. Blank values are kept. When a key repeats, the first
/// occurrence wins.
pub fn decode_urlencoded(body_hex: &str) -> HashMap<String, String> {
    let text = decode_hex_body(body_hex)
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .unwrap_or_default();

    let mut params = HashMap::new();
    for (key, value) in form_urlencoded::parse(text.as_bytes()) {
        params
            .entry(key.into_owned())
            .or_insert_with(|| value.into_owned());
    }
    params
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(text: &str) -> HashMap<String, String> {
        decode_urlencoded(&hex::encode(text))
    }

    #[test]
    fn decodes_credentials() {
        let params = decode("username=admin&password=123");
        assert_eq!(params.len(), 2);
        assert_eq!(params["username"], "admin");
        assert_eq!(params["password"], "123");
    }

    #[test]
    fn first_occurrence_wins() {
        let params = decode("username=admin&username=root");
        assert_eq!(params.len(), 1);
        assert_eq!(params["username"], "admin");
    }

    #[test]
    fn percent_and_plus_are_decoded() {
        let params = decode("name=Jane+Q%2E+Public&phone=%2B1%20555");
        assert_eq!(params["name"], "Jane Q. Public");
        assert_eq!(params["phone"], "+1 555");
    }

    #[test]
    fn blank_values_are_kept() {
        let params = decode("phone=&name=bob");
        assert_eq!(params["phone"], "");
        assert_eq!(params["name"], "bob");
    }

    #[test]
    fn invalid_utf8_is_replaced() {
        let mut raw = b"name=".to_vec();
        raw.push(0xFF);
        let params = decode_urlencoded(&hex::encode(raw));
        assert_eq!(params["name"], "\u{FFFD}");
    }

    #[test]
    fn invalid_hex_is_an_empty_body() {
        assert!(decode_urlencoded("not hex").is_empty());
        assert!(decode_urlencoded("123").is_empty());
    }
}
