//! Which end of the connection a codec is serving.

/// Endpoint role; fixes the masking direction.
///
/// Frames travelling client to server are masked, frames travelling server to
/// client are not. This crate runs as [`Role::Client`]; [`Role::Server`] exists
/// so the codec can decode what a client writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Role {
    #[default]
    Client,
    Server,
}

impl Role {
    /// Whether frames written by this role carry a mask.
    #[inline]
    #[must_use]
    pub const fn must_mask(&self) -> bool {
        matches!(self, Role::Client)
    }

    /// Whether frames read by this role must carry a mask.
    #[inline]
    #[must_use]
    pub const fn expects_masked(&self) -> bool {
        matches!(self, Role::Server)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Role::Client => "client",
            Role::Server => "server",
        })
    }
}
