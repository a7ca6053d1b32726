use chrono::Utc;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{Condition, Time};

/// Sets the corresponding condition in `conditions` to `new_condition` and returns a tuple
/// containing the new conditions vector and whether it was changed.
///
/// 1. If a condition of the same type already exists, its fields are updated in place.
///    `last_transition_time` is bumped only when `status` actually changes.
/// 2. If no condition of that type exists yet, `new_condition` is appended with
///    `last_transition_time` set to now.
pub fn set_status_condition(conditions: &[Condition], mut new_condition: Condition) -> (Vec<Condition>, bool) {
    let mut new_conditions = Vec::from(conditions);
    let mut changed = false;

    if let Some(index) = new_conditions.iter().position(|c| c.type_ == new_condition.type_) {
        let existing = &mut new_conditions[index];

        if existing.status != new_condition.status {
            existing.status = new_condition.status.clone();
            existing.last_transition_time = Time(Utc::now());
            changed = true;
        }

        if existing.reason != new_condition.reason {
            existing.reason = new_condition.reason.clone();
            changed = true;
        }

        if existing.message != new_condition.message {
            existing.message = new_condition.message.clone();
            changed = true;
        }

        if existing.observed_generation != new_condition.observed_generation {
            existing.observed_generation = new_condition.observed_generation;
            changed = true;
        }
    } else {
        new_condition.last_transition_time = Time(Utc::now());
        new_conditions.push(new_condition);
        changed = true;
    }

    (new_conditions, changed)
}

/// Removes the condition of the given type, if present.
pub fn remove_status_condition(conditions: &[Condition], condition_type: &str) -> (Vec<Condition>, bool) {
    let mut new_conditions = conditions.to_vec();
    let original_len = new_conditions.len();
    new_conditions.retain(|condition| condition.type_ != condition_type);
    let removed = new_conditions.len() != original_len;
    (new_conditions, removed)
}

pub fn find_status_condition<'a>(conditions: &'a [Condition], condition_type: &str) -> Option<&'a Condition> {
    conditions.iter().find(|condition| condition.type_ == condition_type)
}

pub fn is_status_condition_true(conditions: &[Condition], condition_type: &str) -> bool {
    is_status_condition_present_and_equal(conditions, condition_type, "True")
}

pub fn is_status_condition_false(conditions: &[Condition], condition_type: &str) -> bool {
    is_status_condition_present_and_equal(conditions, condition_type, "False")
}

fn is_status_condition_present_and_equal(conditions: &[Condition], condition_type: &str, status: &str) -> bool {
    conditions
        .iter()
        .any(|condition| condition.type_ == condition_type && condition.status == status)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn condition(type_: &str, status: &str, reason: &str) -> Condition {
        Condition {
            type_: type_.to_string(),
            status: status.to_string(),
            reason: reason.to_string(),
            message: "test message".to_string(),
            last_transition_time: Time(Utc::now()),
            observed_generation: Some(1),
        }
    }

    #[test]
    fn set_status_condition_adds_new_condition() {
        let (conditions, changed) = set_status_condition(&[], condition("HealthCheck", "True", "Testing"));
        assert!(changed);
        assert_eq!(conditions.len(), 1);
        assert_eq!(conditions[0].type_, "HealthCheck");
    }

    #[test]
    fn set_status_condition_updates_existing_condition() {
        let (conditions, _) = set_status_condition(&[], condition("HealthCheck", "True", "Testing"));
        let (conditions, changed) =
            set_status_condition(&conditions, condition("HealthCheck", "False", "FailedHealthCheck"));
        assert!(changed);
        assert_eq!(conditions.len(), 1);
        assert_eq!(conditions[0].status, "False");
        assert_eq!(conditions[0].reason, "FailedHealthCheck");
    }

    #[test]
    fn set_status_condition_is_noop_when_unchanged() {
        let (conditions, _) = set_status_condition(&[], condition("HealthCheck", "True", "Testing"));
        let (conditions, changed) = set_status_condition(&conditions, condition("HealthCheck", "True", "Testing"));
        assert!(!changed);
        assert_eq!(conditions.len(), 1);
    }

    #[test]
    fn remove_status_condition_removes_matching_type() {
        let (conditions, _) = set_status_condition(&[], condition("HealthCheck", "True", "Testing"));
        let (conditions, removed) = remove_status_condition(&conditions, "HealthCheck");
        assert!(removed);
        assert!(conditions.is_empty());
    }

    #[test]
    fn is_status_condition_true_reflects_current_status() {
        let (conditions, _) = set_status_condition(&[], condition("HealthCheck", "True", "Testing"));
        assert!(is_status_condition_true(&conditions, "HealthCheck"));
        assert!(!is_status_condition_false(&conditions, "HealthCheck"));
    }
}
