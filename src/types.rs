use serde::{Deserialize, Serialize};

/// Catalog product as served by the products service.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    pub sku: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub price: f64,
    #[serde(default)]
    pub stock: i64,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

#[derive(Serialize)]
pub(crate) struct LoginRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct LoginResponse {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
}

impl std::fmt::Debug for LoginResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginResponse")
            .field("access_token", &"<redacted>")
            .field("token_type", &self.token_type)
            .finish()
    }
}

fn default_true() -> bool {
    true
}

fn default_token_type() -> String {
    "bearer".to_owned()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{LoginResponse, Product};

    #[test]
    fn product_fills_optional_fields() {
        let product: Product = serde_json::from_value(json!({
            "id": 3,
            "sku": "KT-100",
            "name": "Kettle",
            "price": 24.5
        }))
        .unwrap();

        assert_eq!(product.description, None);
        assert_eq!(product.stock, 0);
        assert!(product.is_active);
    }

    #[test]
    fn login_response_debug_hides_token() {
        let login: LoginResponse =
            serde_json::from_value(json!({"access_token": "jwt-secret"})).unwrap();
        assert_eq!(login.token_type, "bearer");
        assert!(!format!("{login:?}").contains("jwt-secret"));
    }
}
