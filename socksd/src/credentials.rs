use crate::{Authenticator, ConnectionInfo};
use anyhow::Result;
use async_trait::async_trait;

#[derive(Clone, Debug, PartialEq)]
pub struct Credentials {
    pub username: Vec<u8>,
    pub password: Vec<u8>,
}

impl Credentials {
    ///
    ///
    ///
    pub fn new<S: Into<Vec<u8>>>(
        username: S,
        password: S,
    ) -> Self {
        let username = username.into();
        let password = password.into();

        Credentials { username, password }
    }

    /// Username/password request body (ULEN, UNAME, PLEN, PASSWD).
    pub fn as_socks_bytes(&self) -> Result<Vec<u8>> {
        ensure!(self.username.len() <= 255, "Username MUST NOT be larger than 255 bytes.");
        ensure!(self.password.len() <= 255, "Password MUST NOT be larger than 255 bytes.");

        // Append username
        let mut bytes = vec![self.username.len() as u8];
        bytes.extend(self.username.clone());

        // Append password
        bytes.push(self.password.len() as u8);
        bytes.extend(self.password.clone());

        Ok(bytes)
    }
}

/// A single static username/password pair acts as an authenticator.
#[async_trait]
impl Authenticator for Credentials {
    async fn authenticate(
        &self,
        username: String,
        password: String,
        _: ConnectionInfo,
    ) -> Result<bool> {
        Ok(username.as_bytes() == &self.username[..] && password.as_bytes() == &self.password[..])
    }
}
