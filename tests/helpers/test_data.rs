//! Request builders and fixed timestamps for tests

use chrono::{DateTime, Duration, TimeZone, Utc};
use SwovieMatch::models::{
    CreateGroupRequest, Decision, GroupId, ItemId, JoinGroupRequest, MemberId, RecordSwipeRequest,
};

pub const CREDENTIAL: &str = "secret";

pub fn member(id: &str) -> MemberId {
    MemberId::from(id)
}

pub fn create_request(creator: &str, capacity: i32) -> CreateGroupRequest {
    CreateGroupRequest {
        capacity,
        credential: CREDENTIAL.to_string(),
        creator: member(creator),
    }
}

pub fn join_request(group_id: GroupId, member_id: &str, credential: &str) -> JoinGroupRequest {
    JoinGroupRequest {
        group_id,
        credential: credential.to_string(),
        member_id: member(member_id),
    }
}

/// A fixed base instant plus `offset` seconds
pub fn at(offset: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 7, 1, 20, 0, 0).unwrap() + Duration::seconds(offset)
}

pub fn swipe(
    group_id: GroupId,
    member_id: &str,
    item: i64,
    decision: Decision,
    offset: i64,
) -> RecordSwipeRequest {
    RecordSwipeRequest {
        group_id,
        member_id: member(member_id),
        item_id: ItemId(item),
        decision,
        timestamp: Some(at(offset)),
    }
}

pub fn approve(group_id: GroupId, member_id: &str, item: i64, offset: i64) -> RecordSwipeRequest {
    swipe(group_id, member_id, item, Decision::Approve, offset)
}

pub fn reject(group_id: GroupId, member_id: &str, item: i64, offset: i64) -> RecordSwipeRequest {
    swipe(group_id, member_id, item, Decision::Reject, offset)
}
