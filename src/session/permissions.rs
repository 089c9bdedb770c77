/// Permission and subscription tier checks
use super::types::User;

/// Ordered tier ladders; a higher index grants everything below it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TierLadder {
    /// free < pro < premium
    #[default]
    Standard,
    /// free < basic < pro < enterprise
    Business,
}

impl TierLadder {
    pub fn tiers(&self) -> &'static [&'static str] {
        match self {
            TierLadder::Standard => &["free", "pro", "premium"],
            TierLadder::Business => &["free", "basic", "pro", "enterprise"],
        }
    }

    /// Position of `tier` on this ladder, `None` if it is not on it
    pub fn rank(&self, tier: &str) -> Option<usize> {
        self.tiers()
            .iter()
            .position(|t| t.eq_ignore_ascii_case(tier.trim()))
    }
}

pub fn has_permission(user: Option<&User>, permission: &str) -> bool {
    user.map(|u| u.permissions.iter().any(|p| p == permission))
        .unwrap_or(false)
}

/// Whether `user` is at or above `required` on `ladder`
///
/// Without a user only the free tier is granted. A user whose tier is not
/// on the ladder is treated as free; a required tier not on the ladder is
/// never granted.
pub fn has_tier(user: Option<&User>, required: &str, ladder: TierLadder) -> bool {
    let required_rank = match ladder.rank(required) {
        Some(rank) => rank,
        None => return false,
    };
    let user_rank = user
        .and_then(|u| ladder.rank(&u.subscription_tier))
        .unwrap_or(0);
    user_rank >= required_rank
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn user(tier: &str, permissions: &[&str]) -> User {
        serde_json::from_value(json!({
            "id": 1,
            "subscription_tier": tier,
            "permissions": permissions,
        }))
        .unwrap()
    }

    #[test]
    fn test_standard_ladder() {
        let pro = user("pro", &[]);
        assert!(has_tier(Some(&pro), "free", TierLadder::Standard));
        assert!(has_tier(Some(&pro), "pro", TierLadder::Standard));
        assert!(!has_tier(Some(&pro), "premium", TierLadder::Standard));
        assert!(has_tier(Some(&user("Premium", &[])), "pro", TierLadder::Standard));
    }

    #[test]
    fn test_business_ladder_and_unknown_tiers() {
        let basic = user("basic", &[]);
        assert!(has_tier(Some(&basic), "basic", TierLadder::Business));
        assert!(!has_tier(Some(&basic), "pro", TierLadder::Business));
        // "basic" is not on the standard ladder
        assert!(!has_tier(Some(&basic), "pro", TierLadder::Standard));
        assert!(has_tier(Some(&basic), "free", TierLadder::Standard));
        assert!(!has_tier(Some(&basic), "gold", TierLadder::Business));
    }

    #[test]
    fn test_anonymous_gets_free_only() {
        assert!(has_tier(None, "free", TierLadder::Standard));
        assert!(!has_tier(None, "pro", TierLadder::Standard));
        assert!(!has_tier(None, "basic", TierLadder::Business));
        assert!(!has_permission(None, "signals:read"));
    }

    #[test]
    fn test_permissions_are_exact_matches() {
        let u = user("free", &["signals:read", "portfolio:read"]);
        assert!(has_permission(Some(&u), "signals:read"));
        assert!(!has_permission(Some(&u), "signals"));
    }
}
