use serde::{Deserialize, Serialize};

/// 固定的角色集合。数据库中以小写文本存储，token里同样小写。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Organizer,
    Volunteer,
    Attendee,
    Vip,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Organizer => "organizer",
            Role::Volunteer => "volunteer",
            Role::Attendee => "attendee",
            Role::Vip => "vip",
        }
    }

    pub fn parse(s: &str) -> Option<Role> {
        match s {
            "organizer" => Some(Role::Organizer),
            "volunteer" => Some(Role::Volunteer),
            "attendee" => Some(Role::Attendee),
            "vip" => Some(Role::Vip),
            _ => None,
        }
    }
}

/// 需要鉴权的操作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    CreatePoi,
    DeletePoi,
    DeleteAnyMarker,
    KickMember,
    DeleteGroup,
    CreateEmergency,
    ResolveEmergency,
    ManageRoles,
}

/// 权限表。纯函数、无状态、对全部 (角色, 操作) 组合完备。
///
/// `is_owner` 表示调用者是否拥有目标资源（POI的创建者、群组的创建者）。
/// 未在表中显式放行的组合一律拒绝。
pub fn can_perform(role: Role, action: Action, is_owner: bool) -> bool {
    use Action::*;
    use Role::*;

    match (role, action) {
        (Organizer, CreatePoi) => true,
        (Organizer, DeletePoi) => true,
        (Organizer, DeleteAnyMarker) => true,
        (Organizer, KickMember) => true,
        // 组织者也只能删除自己创建的群组
        (Organizer, DeleteGroup) => is_owner,
        (Organizer, CreateEmergency) => true,
        (Organizer, ResolveEmergency) => true,
        (Organizer, ManageRoles) => true,

        (Volunteer, CreatePoi) => true,
        (Volunteer, DeletePoi) => is_owner,
        (Volunteer, CreateEmergency) => true,
        (Volunteer, DeleteAnyMarker | KickMember | DeleteGroup | ResolveEmergency | ManageRoles) => {
            false
        }

        (Attendee | Vip, DeletePoi) => is_owner,
        (Attendee | Vip, CreateEmergency) => true,
        (
            Attendee | Vip,
            CreatePoi | DeleteAnyMarker | KickMember | DeleteGroup | ResolveEmergency | ManageRoles,
        ) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_ROLES: [Role; 4] = [Role::Organizer, Role::Volunteer, Role::Attendee, Role::Vip];
    const ALL_ACTIONS: [Action; 8] = [
        Action::CreatePoi,
        Action::DeletePoi,
        Action::DeleteAnyMarker,
        Action::KickMember,
        Action::DeleteGroup,
        Action::CreateEmergency,
        Action::ResolveEmergency,
        Action::ManageRoles,
    ];

    #[test]
    fn delete_group_requires_creator_even_for_organizer() {
        assert!(!can_perform(Role::Organizer, Action::DeleteGroup, false));
        assert!(can_perform(Role::Organizer, Action::DeleteGroup, true));
    }

    #[test]
    fn only_organizer_may_kick_or_delete_any_marker() {
        for role in ALL_ROLES {
            for action in [Action::KickMember, Action::DeleteAnyMarker] {
                let expected = role == Role::Organizer;
                assert_eq!(can_perform(role, action, true), expected, "{role:?} {action:?}");
            }
        }
    }

    #[test]
    fn poi_deletion_is_owner_scoped_below_organizer() {
        for role in [Role::Volunteer, Role::Attendee, Role::Vip] {
            assert!(can_perform(role, Action::DeletePoi, true));
            assert!(!can_perform(role, Action::DeletePoi, false));
        }
        // 组织者可以删任何POI
        assert!(can_perform(Role::Organizer, Action::DeletePoi, false));
    }

    #[test]
    fn attendee_and_vip_cannot_create_pois() {
        assert!(!can_perform(Role::Attendee, Action::CreatePoi, true));
        assert!(!can_perform(Role::Vip, Action::CreatePoi, true));
        assert!(can_perform(Role::Volunteer, Action::CreatePoi, false));
    }

    #[test]
    fn anyone_may_raise_an_emergency() {
        for role in ALL_ROLES {
            assert!(can_perform(role, Action::CreateEmergency, false));
        }
    }

    #[test]
    fn ownership_never_grants_more_than_the_table_allows() {
        // is_owner 只能把“仅限本人”的操作打开，不能解锁其他任何组合
        for role in ALL_ROLES {
            for action in ALL_ACTIONS {
                if !can_perform(role, action, true) {
                    assert!(!can_perform(role, action, false));
                }
            }
        }
    }

    #[test]
    fn role_round_trips_through_text() {
        for role in ALL_ROLES {
            assert_eq!(Role::parse(role.as_str()), Some(role));
        }
        assert_eq!(Role::parse("superadmin"), None);
    }
}
