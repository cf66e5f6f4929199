//! Capability table for privileged operations.
//!
//! Runtime-configurable authorization: a flat addr -> granted set, checked at
//! the top of every privileged call. No inheritance, no virtual dispatch.

use std::collections::BTreeSet;

use crate::error::{Error, Result};
use crate::Addr;

#[derive(Clone, Debug, Default)]
pub struct Wards {
    granted: BTreeSet<Addr>,
}

impl Wards {
    /// A table with one initial ward (the deployer).
    pub fn with_root(root: Addr) -> Self {
        let mut granted = BTreeSet::new();
        granted.insert(root);
        Wards { granted }
    }

    pub fn rely(&mut self, caller: Addr, usr: Addr) -> Result<()> {
        self.auth(caller)?;
        self.granted.insert(usr);
        Ok(())
    }

    pub fn deny(&mut self, caller: Addr, usr: Addr) -> Result<()> {
        self.auth(caller)?;
        self.granted.remove(&usr);
        Ok(())
    }

    pub fn is_ward(&self, usr: Addr) -> bool {
        self.granted.contains(&usr)
    }

    /// Precondition check for privileged operations.
    pub fn auth(&self, caller: Addr) -> Result<()> {
        if self.is_ward(caller) {
            Ok(())
        } else {
            Err(Error::Unauthorized)
        }
    }
}
