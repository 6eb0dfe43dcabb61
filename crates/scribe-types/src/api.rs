use serde::{Deserialize, Serialize};

// -- Generic --

/// A short human-readable outcome, shown to the user as-is.
#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    #[serde(default = "first_page")]
    pub page: u32,
}

#[derive(Debug, Deserialize)]
pub struct IndexQuery {
    #[serde(default = "first_page")]
    pub page: u32,
    #[serde(default)]
    pub followed: bool,
}

fn first_page() -> u32 {
    1
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub email: String,
    pub username: String,
    pub password: String,
    pub password2: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub user_id: i64,
    pub message: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub remember_me: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub user_id: i64,
    pub username: String,
    pub confirmed: bool,
    pub token: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UnconfirmedResponse {
    pub confirmed: bool,
    pub email: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChangePasswordRequest {
    pub old_password: String,
    pub new_password: String,
    pub new_password2: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChangeEmailRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResetRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResetPasswordRequest {
    pub password: String,
    pub password2: String,
}

// -- Profiles --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EditProfileRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub about_me: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AdminEditProfileRequest {
    pub email: String,
    pub username: String,
    pub confirmed: bool,
    pub role_id: i64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub about_me: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AdminUserSummary {
    pub id: i64,
    pub username: String,
    pub email: String,
}

// -- Posts & comments --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PostRequest {
    pub body: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CommentRequest {
    pub body: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AdminOverview {
    pub users: Vec<AdminUserSummary>,
    pub roles: Vec<crate::models::RoleInfo>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProfileResponse {
    pub profile: crate::models::UserProfile,
    pub posts: Vec<crate::models::Post>,
    /// The viewer follows this user. Always false for anonymous viewers.
    pub is_following: bool,
    /// This user follows the viewer.
    pub follows_you: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PostDetail {
    pub post: crate::models::Post,
    pub comments: crate::models::Page<crate::models::Comment>,
}
