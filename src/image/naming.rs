use uuid::Uuid;

/// Random base name shared by an original image and its derivative.
///
/// 128 random bits rendered as 32 lowercase hex digits, so the name is safe
/// in any path and practically never collides across concurrent requests.
pub fn generate_base_name() -> String {
    Uuid::new_v4().simple().to_string()
}
