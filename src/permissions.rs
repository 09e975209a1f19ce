use serde::{Deserialize, Serialize};

use crate::roles::Role;

/// Entity type recorded in audit entries for taxonomy mutations.
pub const CATEGORY_ENTITY_TYPE: &str = "category";
/// Entity type recorded in audit entries for site-wide settings.
pub const SYSTEM_ENTITY_TYPE: &str = "system";

/// Every gated action. The minimum role for each lives in
/// [`Action::required_role`] and nowhere else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    ListCategories,
    CreateCategory,
    UpdateCategory,
    DeleteCategory,
    ReadSettings,
    UpdateSettings,
}

pub const ALL_ACTIONS: &[Action] = &[
    Action::ListCategories,
    Action::CreateCategory,
    Action::UpdateCategory,
    Action::DeleteCategory,
    Action::ReadSettings,
    Action::UpdateSettings,
];

impl Action {
    pub const fn required_role(self) -> Role {
        match self {
            Action::ListCategories => Role::Viewer,
            Action::CreateCategory | Action::UpdateCategory | Action::DeleteCategory => {
                Role::Contributor
            }
            Action::ReadSettings => Role::Contributor,
            Action::UpdateSettings => Role::Administrator,
        }
    }

    pub const fn audit_name(self) -> &'static str {
        match self {
            Action::ListCategories => "list_categories",
            Action::CreateCategory => "create_category",
            Action::UpdateCategory => "update_category",
            Action::DeleteCategory => "delete_category",
            Action::ReadSettings => "read_settings",
            Action::UpdateSettings => "update_settings",
        }
    }

    pub fn permits(self, role: Role) -> bool {
        role.satisfies(self.required_role())
    }
}

/// Actions the given role may perform, in declaration order.
pub fn permitted_actions(role: Role) -> Vec<Action> {
    ALL_ACTIONS
        .iter()
        .copied()
        .filter(|action| action.permits(role))
        .collect()
}
