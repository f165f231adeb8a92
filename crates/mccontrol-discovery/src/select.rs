//! Candidate and endpoint selection rules.

use mccontrol_core::{EndpointInfo, InstanceInfo, Phase};

/// Pick the instance to bind to.
///
/// The first running instance wins; otherwise the most recently started
/// succeeded one; otherwise the first candidate.
#[must_use]
pub fn select_instance(candidates: &[InstanceInfo]) -> Option<&InstanceInfo> {
    if let Some(running) = candidates.iter().find(|i| i.phase == Phase::Running) {
        return Some(running);
    }

    let mut latest_succeeded: Option<&InstanceInfo> = None;
    for candidate in candidates.iter().filter(|i| i.phase == Phase::Succeeded) {
        match latest_succeeded {
            Some(best) if best.started_at >= candidate.started_at => {}
            _ => latest_succeeded = Some(candidate),
        }
    }

    latest_succeeded.or_else(|| candidates.first())
}

/// External address of the first externally exposed endpoint serving `port`.
#[must_use]
pub fn external_address_for(endpoints: &[EndpointInfo], port: u16) -> Option<String> {
    endpoints
        .iter()
        .filter(|ep| ep.kind.is_external() && ep.exposes(port))
        .find_map(|ep| ep.external_address().map(str::to_string))
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use mccontrol_core::{EndpointKind, EndpointPort};
    use mccontrol_test_utils::instance;

    use super::*;

    #[test]
    fn test_running_wins() {
        let candidates = vec![
            instance("mc-old", "10.0.0.1", Phase::Succeeded),
            instance("mc-1", "10.0.0.2", Phase::Running),
            instance("mc-2", "10.0.0.3", Phase::Running),
        ];
        assert_eq!(select_instance(&candidates).unwrap().name, "mc-1");
    }

    #[test]
    fn test_latest_succeeded_when_none_running() {
        let mut older = instance("mc-a", "10.0.0.1", Phase::Succeeded);
        older.started_at = Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        let mut newer = instance("mc-b", "10.0.0.2", Phase::Succeeded);
        newer.started_at = Some(Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap());
        let candidates = vec![instance("mc-p", "", Phase::Pending), older, newer];
        assert_eq!(select_instance(&candidates).unwrap().name, "mc-b");
    }

    #[test]
    fn test_first_candidate_fallback() {
        let candidates = vec![
            instance("mc-p", "", Phase::Pending),
            instance("mc-f", "", Phase::Failed),
        ];
        assert_eq!(select_instance(&candidates).unwrap().name, "mc-p");
        assert!(select_instance(&[]).is_none());
    }

    #[test]
    fn test_external_address_requires_exposed_kind_and_port() {
        let internal = EndpointInfo {
            name: "internal".into(),
            kind: EndpointKind::ClusterInternal,
            ports: vec![EndpointPort { port: 25565, target_port: None }],
            ingress_addresses: vec!["192.0.2.1".into()],
            external_addresses: vec![],
        };
        let other_port = EndpointInfo {
            name: "rcon".into(),
            kind: EndpointKind::LoadBalancer,
            ports: vec![EndpointPort { port: 25575, target_port: None }],
            ingress_addresses: vec!["192.0.2.2".into()],
            external_addresses: vec![],
        };
        let game = EndpointInfo {
            name: "game".into(),
            kind: EndpointKind::LoadBalancer,
            ports: vec![EndpointPort { port: 25565, target_port: None }],
            ingress_addresses: vec!["192.0.2.3".into()],
            external_addresses: vec![],
        };
        assert_eq!(
            external_address_for(&[internal, other_port, game], 25565).as_deref(),
            Some("192.0.2.3")
        );
        assert_eq!(external_address_for(&[], 25565), None);
    }
}
