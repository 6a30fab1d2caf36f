//! Pure permission cascade: a plain value type with no I/O of its own.
//! Resolving "which roles does this user hold" is an external
//! collaborator's job (the chat platform); this only ever applies the
//! cascade once booleans are in hand.

use serde::{Deserialize, Serialize};

/// `owner` implies `admin`; `admin` implies `read` and `write`;
/// `write` implies `read`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permissions {
    pub read: bool,
    pub write: bool,
    pub admin: bool,
    pub owner: bool,
}

impl Permissions {
    pub fn new(read: bool, write: bool, admin: bool, owner: bool) -> Self {
        let mut p = Self {
            read,
            write,
            admin,
            owner,
        };
        p.apply_cascade();
        p
    }

    fn apply_cascade(&mut self) {
        if self.owner {
            self.admin = true;
        }
        if self.admin {
            self.read = true;
            self.write = true;
        }
        if self.write {
            self.read = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owner_implies_everything() {
        let p = Permissions::new(false, false, false, true);
        assert_eq!(p, Permissions::new(true, true, true, true));
    }

    #[test]
    fn write_implies_read_but_not_admin() {
        let p = Permissions::new(false, true, false, false);
        assert!(p.read);
        assert!(p.write);
        assert!(!p.admin);
    }

    #[test]
    fn plain_read_grants_nothing_else() {
        let p = Permissions::new(true, false, false, false);
        assert!(p.read);
        assert!(!p.write);
        assert!(!p.admin);
        assert!(!p.owner);
    }
}
