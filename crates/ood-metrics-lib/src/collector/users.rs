//! uid to user name resolution

use nix::unistd::{Uid, User};
use std::collections::HashMap;
use tracing::debug;

/// Maps a numeric uid to a login name
pub trait UserResolver: Send + Sync {
    fn username(&self, uid: u32) -> Option<String>;
}

/// Resolves through the system name service (`getpwuid_r`)
///
/// Goes through NSS, so LDAP and SSSD accounts resolve the same way local
/// ones do.
#[derive(Debug, Clone, Copy, Default)]
pub struct NssUserResolver;

impl UserResolver for NssUserResolver {
    fn username(&self, uid: u32) -> Option<String> {
        match User::from_uid(Uid::from_raw(uid)) {
            Ok(user) => user.map(|u| u.name),
            Err(e) => {
                debug!(uid = uid, error = %e, "User lookup failed");
                None
            }
        }
    }
}

/// Per-scan memo over a resolver
///
/// Unknown uids fall back to their decimal form.
pub struct OwnerCache<'a> {
    resolver: &'a dyn UserResolver,
    names: HashMap<u32, String>,
}

impl<'a> OwnerCache<'a> {
    pub fn new(resolver: &'a dyn UserResolver) -> Self {
        Self {
            resolver,
            names: HashMap::new(),
        }
    }

    pub fn owner(&mut self, uid: u32) -> String {
        let resolver = self.resolver;
        self.names
            .entry(uid)
            .or_insert_with(|| resolver.username(uid).unwrap_or_else(|| uid.to_string()))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        calls: AtomicUsize,
    }

    impl UserResolver for Counting {
        fn username(&self, uid: u32) -> Option<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            (uid == 5001).then(|| "alice".to_string())
        }
    }

    #[test]
    fn test_cache_resolves_each_uid_once() {
        let resolver = Counting {
            calls: AtomicUsize::new(0),
        };
        let mut cache = OwnerCache::new(&resolver);

        assert_eq!(cache.owner(5001), "alice");
        assert_eq!(cache.owner(5001), "alice");
        assert_eq!(cache.owner(7), "7");
        assert_eq!(cache.owner(7), "7");
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 2);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_nss_resolves_root() {
        assert_eq!(NssUserResolver.username(0).as_deref(), Some("root"));
    }
}
