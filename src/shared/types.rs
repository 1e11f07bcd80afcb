use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Success envelope shared by every endpoint
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub message: String,
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pagination: Option<PageInfo>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T, message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
            pagination: None,
        }
    }

    pub fn paginated(data: T, message: impl Into<String>, pagination: PageInfo) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
            pagination: Some(pagination),
        }
    }
}

/// Failure envelope, `error` is a stable machine readable code
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    pub success: bool,
    pub message: String,
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

// =============================================================================
// PAGINATION
// =============================================================================

/// Pagination block returned next to list results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub page: i64,
    pub limit: i64,
    pub total: i64,
    pub total_pages: i64,
    pub has_next: bool,
    pub has_prev: bool,
}

impl PageInfo {
    /// `page` and `limit` are expected to be already clamped (both >= 1)
    pub fn new(page: i64, limit: i64, total: i64) -> Self {
        let limit = limit.max(1);
        let total = total.max(0);
        let total_pages = (total + limit - 1) / limit;

        Self {
            page,
            limit,
            total,
            total_pages,
            has_next: page < total_pages,
            has_prev: page > 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_info_middle_page() {
        let info = PageInfo::new(2, 10, 25);
        assert_eq!(info.total_pages, 3);
        assert!(info.has_next);
        assert!(info.has_prev);
    }

    #[test]
    fn test_page_info_edges() {
        let empty = PageInfo::new(1, 10, 0);
        assert_eq!(empty.total_pages, 0);
        assert!(!empty.has_next);
        assert!(!empty.has_prev);

        let last = PageInfo::new(3, 10, 30);
        assert_eq!(last.total_pages, 3);
        assert!(!last.has_next);

        let beyond = PageInfo::new(7, 10, 30);
        assert!(!beyond.has_next);
        assert!(beyond.has_prev);
    }

    #[test]
    fn test_error_body_omits_missing_details() {
        let body = ErrorBody {
            success: false,
            message: "File not found".to_string(),
            error: "NOT_FOUND".to_string(),
            details: None,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert!(json.get("details").is_none());
        assert_eq!(json["error"], "NOT_FOUND");
    }
}
