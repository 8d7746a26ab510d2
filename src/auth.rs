//! Basic-auth credentials for the gateway report endpoint.

use std::fmt;
use std::io;
use std::path::Path;

/// File holding the user name.
pub const USER_FILE: &str = "basic-auth-user";
/// File holding the password.
pub const PASSWORD_FILE: &str = "basic-auth-password";

/// Gateway credentials read from the secret mount.
#[derive(Clone, PartialEq, Eq)]
pub struct BasicAuthCredentials {
    /// User name.
    pub user: String,
    /// Password.
    pub password: String,
}

impl BasicAuthCredentials {
    /// Reads `basic-auth-user` and `basic-auth-password` from `dir`, trimming whitespace.
    pub fn read_from(dir: &Path) -> io::Result<Self> {
        let user = std::fs::read_to_string(dir.join(USER_FILE))?;
        let password = std::fs::read_to_string(dir.join(PASSWORD_FILE))?;
        Ok(Self {
            user: user.trim().to_owned(),
            password: password.trim().to_owned(),
        })
    }
}

impl fmt::Debug for BasicAuthCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicAuthCredentials")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_and_trims() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(USER_FILE), "admin\n").unwrap();
        std::fs::write(dir.path().join(PASSWORD_FILE), " s3cret \n").unwrap();

        let creds = BasicAuthCredentials::read_from(dir.path()).unwrap();
        assert_eq!(creds.user, "admin");
        assert_eq!(creds.password, "s3cret");
        assert!(!format!("{creds:?}").contains("s3cret"));
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(USER_FILE), "admin").unwrap();
        assert!(BasicAuthCredentials::read_from(dir.path()).is_err());
    }
}
