use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UserRole {
    Admin,
    Faculty,
    Student,
}

impl UserRole {
    pub fn display_name(&self) -> &'static str {
        match self {
            UserRole::Admin => "Admin",
            UserRole::Faculty => "Faculty",
            UserRole::Student => "Student",
        }
    }
}

/// A campus user. There is no backend in this client; the signed-in user and
/// the peer directory are fabricated locally at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: UserRole,
    pub department: Option<String>,
    pub semester: Option<u8>,
}

impl User {
    fn new(id: &str, name: &str, email: &str, role: UserRole) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            email: email.to_string(),
            role,
            department: None,
            semester: None,
        }
    }
}

/// Seeded campus directory used for peer chat sessions.
pub fn directory() -> Vec<User> {
    vec![
        User {
            department: Some("Computer Engineering".to_string()),
            ..User::new("u1", "Dr. Rajesh Kumar", "rajesh.k@college.edu", UserRole::Faculty)
        },
        User {
            semester: Some(4),
            ..User::new("u2", "Sneha Patil", "sneha.p@student.edu", UserRole::Student)
        },
        User::new("u3", "System Admin", "admin@college.edu", UserRole::Admin),
        User {
            department: Some("Information Technology".to_string()),
            ..User::new("u4", "Prof. Amit Shah", "amit.s@college.edu", UserRole::Faculty)
        },
    ]
}

/// "Signs in" the local user. `CAMPUSCHAT_USER` selects a directory entry by
/// email; otherwise the first faculty member is used.
pub fn sign_in() -> User {
    let mut users = directory();
    if let Ok(email) = std::env::var("CAMPUSCHAT_USER") {
        if let Some(user) = users.iter().find(|u| u.email == email) {
            return user.clone();
        }
    }
    let idx = users
        .iter()
        .position(|u| u.role == UserRole::Faculty)
        .unwrap_or(0);
    users.swap_remove(idx)
}
