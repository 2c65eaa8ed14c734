//! Page location: the URL the checkout was opened with.
//!
//! The hosted payment page sends the customer back to the checkout route
//! with the provider's identifier in a query parameter. Storefront routes
//! are hash routes (`https://shop.example/#/checkout?order_id=...`), so the
//! query may follow the fragment marker; the helpers here accept both forms.

/// Query parameter carrying the external payment identifier on return
pub const RETURN_PARAM: &str = "order_id";

/// The address bar as seen by the checkout
pub trait Location: Send + Sync {
    /// The current URL
    fn href(&self) -> String;

    /// Value of the query parameter `name` in the current URL
    fn query_param(&self, name: &str) -> Option<String> {
        query_param(&self.href(), name)
    }

    /// Removes `name` from the current URL without navigating (history replace)
    fn strip_query_param(&self, name: &str);

    /// Leaves the page for `url`
    fn navigate(&self, url: &str);
}

/// Byte range of the query string inside `url`, without the leading `?`
fn query_range(url: &str) -> Option<(usize, usize)> {
    let start = url.find('?')? + 1;
    let end = url[start..].find('#').map_or(url.len(), |offset| start + offset);
    Some((start, end))
}

/// Value of `name` in the query string of `url`; empty values count as absent.
#[must_use]
pub fn query_param(url: &str, name: &str) -> Option<String> {
    let (start, end) = query_range(url)?;
    url[start..end]
        .split('&')
        .map(|pair| pair.split_once('=').unwrap_or((pair, "")))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_string())
        .filter(|value| !value.is_empty())
}

/// `url` with every occurrence of `name` removed from its query string.
///
/// A query left empty loses its `?` as well.
#[must_use]
pub fn without_query_param(url: &str, name: &str) -> String {
    let Some((start, end)) = query_range(url) else {
        return url.to_string();
    };
    let kept: Vec<&str> = url[start..end]
        .split('&')
        .filter(|pair| !pair.is_empty() && pair.split('=').next() != Some(name))
        .collect();

    let head = &url[..start - 1];
    let tail = &url[end..];
    if kept.is_empty() {
        format!("{head}{tail}")
    } else {
        format!("{head}?{}{tail}", kept.join("&"))
    }
}

/// `url` with `name=value` appended to its query string.
#[must_use]
pub fn with_query_param(url: &str, name: &str, value: &str) -> String {
    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{url}{separator}{name}={value}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_param_from_hash_route() {
        let url = "https://shop.example/#/checkout?order_id=order_42&lang=en";
        assert_eq!(query_param(url, "order_id").as_deref(), Some("order_42"));
        assert_eq!(query_param(url, "lang").as_deref(), Some("en"));
        assert_eq!(query_param(url, "missing"), None);
    }

    #[test]
    fn query_stops_at_fragment() {
        let url = "https://shop.example/checkout?order_id=abc#summary";
        assert_eq!(query_param(url, "order_id").as_deref(), Some("abc"));
        assert_eq!(
            without_query_param(url, "order_id"),
            "https://shop.example/checkout#summary"
        );
    }

    #[test]
    fn empty_value_is_absent() {
        assert_eq!(query_param("https://shop.example/#/checkout?order_id=", "order_id"), None);
    }

    #[test]
    fn strips_only_named_param() {
        let url = "https://shop.example/#/checkout?lang=en&order_id=x&ref=mail";
        assert_eq!(
            without_query_param(url, "order_id"),
            "https://shop.example/#/checkout?lang=en&ref=mail"
        );
        assert_eq!(
            without_query_param("https://shop.example/#/checkout?order_id=x", "order_id"),
            "https://shop.example/#/checkout"
        );
        assert_eq!(
            without_query_param("https://shop.example/#/checkout", "order_id"),
            "https://shop.example/#/checkout"
        );
    }

    #[test]
    fn appends_with_right_separator() {
        assert_eq!(
            with_query_param("https://shop.example/#/checkout", RETURN_PARAM, "{order_id}"),
            "https://shop.example/#/checkout?order_id={order_id}"
        );
        assert_eq!(
            with_query_param("https://shop.example/pay?x=1", "order_id", "a"),
            "https://shop.example/pay?x=1&order_id=a"
        );
    }
}
