//! Ordered capability levels.
//!
//! Every gated action declares a minimum [`Role`]; an identity is admitted
//! when its role ranks at or above that minimum. Ordering:
//! `Viewer < Contributor < Administrator < Owner`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum Role {
    #[default]
    Viewer = 0,
    Contributor = 1,
    Administrator = 2,
    Owner = 3,
}

pub const ALL_ROLES: &[Role] = &[
    Role::Viewer,
    Role::Contributor,
    Role::Administrator,
    Role::Owner,
];

impl Role {
    pub const fn rank(self) -> u8 {
        self as u8
    }

    pub const fn from_rank(rank: u8) -> Option<Self> {
        match rank {
            0 => Some(Role::Viewer),
            1 => Some(Role::Contributor),
            2 => Some(Role::Administrator),
            3 => Some(Role::Owner),
            _ => None,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Role::Viewer => "viewer",
            Role::Contributor => "contributor",
            Role::Administrator => "administrator",
            Role::Owner => "owner",
        }
    }

    /// Parses a stored role name. Canonical names and the legacy account
    /// names (`user`, `editor`, `admin`, `super_admin`) are recognised;
    /// anything else is the lowest rank.
    pub fn parse_lenient(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "viewer" | "user" => Role::Viewer,
            "contributor" | "editor" => Role::Contributor,
            "administrator" | "admin" => Role::Administrator,
            "owner" | "super_admin" => Role::Owner,
            _ => Role::Viewer,
        }
    }

    pub const fn satisfies(self, required: Role) -> bool {
        satisfies(self, required)
    }
}

/// True iff `actual` ranks at or above `required`.
pub const fn satisfies(actual: Role, required: Role) -> bool {
    actual.rank() >= required.rank()
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Role::parse_lenient(s))
    }
}

impl<'de> Deserialize<'de> for Role {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Ok(Role::parse_lenient(&raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_names_map_onto_ranks() {
        assert_eq!(Role::parse_lenient("user"), Role::Viewer);
        assert_eq!(Role::parse_lenient("editor"), Role::Contributor);
        assert_eq!(Role::parse_lenient(" Admin "), Role::Administrator);
        assert_eq!(Role::parse_lenient("super_admin"), Role::Owner);
    }

    #[test]
    fn unknown_roles_are_lowest_rank() {
        assert_eq!(Role::parse_lenient(""), Role::Viewer);
        assert_eq!(Role::parse_lenient("root"), Role::Viewer);
        assert!(!Role::parse_lenient("root").satisfies(Role::Contributor));
        assert!(Role::parse_lenient("root").satisfies(Role::Viewer));
    }

    #[test]
    fn deserialize_never_fails_on_unknown_role() {
        let role: Role = serde_json::from_str("\"superuser\"").expect("lenient deserialize");
        assert_eq!(role, Role::Viewer);
        let role: Role = serde_json::from_str("\"owner\"").expect("canonical deserialize");
        assert_eq!(role, Role::Owner);
    }

    #[test]
    fn serializes_canonical_name() {
        let value = serde_json::to_value(Role::Administrator).expect("serialize role");
        assert_eq!(value, serde_json::json!("administrator"));
    }

    #[test]
    fn contributor_cannot_manage_settings() {
        assert!(Role::Contributor.satisfies(Role::Contributor));
        assert!(!Role::Contributor.satisfies(Role::Administrator));
        assert!(Role::Owner.satisfies(Role::Administrator));
    }

    mod proptests {
        use proptest::prelude::*;

        use super::super::*;

        fn arb_role() -> impl Strategy<Value = Role> {
            (0u8..=3).prop_map(|rank| Role::from_rank(rank).expect("rank in range"))
        }

        proptest! {
            #[test]
            fn satisfies_matches_rank_order(actual in arb_role(), required in arb_role()) {
                prop_assert_eq!(satisfies(actual, required), actual.rank() >= required.rank());
            }

            #[test]
            fn satisfies_is_reflexive(role in arb_role()) {
                prop_assert!(satisfies(role, role));
            }

            #[test]
            fn satisfies_is_monotonic(
                actual in arb_role(),
                stronger in arb_role(),
                required in arb_role(),
            ) {
                if satisfies(actual, required) && stronger.rank() >= actual.rank() {
                    prop_assert!(satisfies(stronger, required));
                }
            }

            #[test]
            fn arbitrary_strings_never_exceed_known_names(raw in "\\PC{0,16}") {
                let parsed = Role::parse_lenient(&raw);
                prop_assert!(ALL_ROLES.contains(&parsed));
            }
        }
    }
}
