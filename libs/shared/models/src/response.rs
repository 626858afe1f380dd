use serde::Serialize;
use serde_json::{json, Value};

/// Success envelope shared by every endpoint: `{"success": true, "message"?, "data"}`.
pub fn success<T: Serialize>(message: Option<String>, data: T) -> Value {
    match message {
        Some(message) => json!({
            "success": true,
            "message": message,
            "data": data,
        }),
        None => json!({
            "success": true,
            "data": data,
        }),
    }
}

/// Listing envelope with an item count.
pub fn listing<T: Serialize>(items: &[T]) -> Value {
    json!({
        "success": true,
        "count": items.len(),
        "data": items,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_without_message() {
        let body = success(None, json!({"id": 1}));
        assert_eq!(body["success"], true);
        assert!(body.get("message").is_none());
        assert_eq!(body["data"]["id"], 1);
    }

    #[test]
    fn test_listing_counts_items() {
        let body = listing(&[1, 2, 3]);
        assert_eq!(body["count"], 3);
        assert_eq!(body["data"], json!([1, 2, 3]));
    }
}
