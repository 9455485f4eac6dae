// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Scenario tests of the forwarding rules manager

#![cfg(test)]

mod tests {
    use crate::container::{ContainerFlow, ContainerView};
    use crate::engine::FlowEngine;
    use crate::errors::{ConflictKind, FrmError};
    use crate::flowentry::FlowEntry;
    use crate::install::EntryStatus;
    use crate::manager::{
        CATCH_ALL_DROP_FLOW, ForwardingRulesManager, PUNT_ARP_FLOW, PUNT_LLDP_FLOW,
    };
    use crate::params::{FrmParams, FrmParamsBuilder, ParamsError};
    use crate::report::{Outcome, SkipReason};
    use crate::staticflow::{
        STATIC_FLOWS_GROUP, STATUS_CONTAINER_MODE, STATUS_NODE_DOWN, STATUS_PORT_REMOVED,
        STATUS_SUCCESS, StaticFlow,
    };
    use crate::testing::{CallKind, MockProgrammer};
    use pretty_assertions::assert_eq;
    use sal::flow::{ETHERTYPE_IPV4, IPPROTO_TCP};
    use sal::{
        Action, Flow, FlowProgrammer, IdTypeRegistry, Match, Node, NodeConnector,
        ProgrammerError, UpdateType,
    };
    use std::sync::{Arc, OnceLock, Weak};
    use std::time::Duration;
    use tracing_test::traced_test;

    struct Fixture {
        programmer: Arc<MockProgrammer>,
        container: Arc<ContainerView>,
        frm: ForwardingRulesManager,
    }

    fn fixture() -> Fixture {
        let programmer = Arc::new(MockProgrammer::new());
        let container = Arc::new(ContainerView::default());
        let frm = ForwardingRulesManager::new(
            FrmParams::default(),
            programmer.clone(),
            container.clone(),
        )
        .unwrap();
        Fixture {
            programmer,
            container,
            frm,
        }
    }

    fn node(n: u64) -> Node {
        Node::new(&IdTypeRegistry::with_defaults(), "OF", n).unwrap()
    }

    fn port(n: u64, p: u64) -> NodeConnector {
        NodeConnector::new(&IdTypeRegistry::with_defaults(), "OF", p, node(n)).unwrap()
    }

    fn request(n: u64, name: &str, matching: Match) -> FlowEntry {
        FlowEntry::new(
            node(n),
            name,
            Flow::new(matching, vec![Action::Output(port(n, 1))]).with_priority(10),
        )
    }

    fn tcp(dport: u16) -> Match {
        Match::any()
            .with_dl_type(ETHERTYPE_IPV4)
            .with_nw_proto(IPPROTO_TCP)
            .with_tp_dst(dport)
    }

    fn vlan(v: u16) -> ContainerFlow {
        ContainerFlow::new(Match::any().with_dl_vlan(v))
    }

    /// Make the container slice traffic by vlans
    fn slice(fx: &Fixture, vlans: &[u16]) {
        fx.container
            .set_container_flows(vlans.iter().map(|v| vlan(*v)).collect());
    }

    /// The database and the mock flow tables must agree
    fn check_in_sync(fx: &Fixture) {
        let db = fx.frm.engine().database();
        db.check_consistency().unwrap();
        assert_eq!(db.len(), fx.programmer.table_size());
        for entry in db.all_entries() {
            assert!(fx.programmer.table(entry.node()).contains(entry.flow()));
        }
    }

    fn snapshot(fx: &Fixture) -> Vec<String> {
        fx.frm.engine().database().snapshot()
    }

    #[test]
    fn install_and_uninstall() {
        let fx = fixture();
        let web = request(1, "web", tcp(80));
        let report = fx.frm.install_flow_entry(&web).unwrap();
        assert_eq!(report.succeeded(), 1);
        assert_eq!(fx.programmer.table(&node(1)), vec![web.flow.clone()]);
        check_in_sync(&fx);

        fx.frm.uninstall_flow_entry(&web).unwrap();
        assert!(fx.frm.engine().database().is_empty());
        check_in_sync(&fx);

        // removing again is not an error and does not reach the node
        let report = fx.frm.uninstall_flow_entry(&web).unwrap();
        assert!(report.is_empty());
        assert_eq!(fx.programmer.count(CallKind::Remove), 1);
    }

    #[test]
    fn reject_unnamed_and_duplicates() {
        let fx = fixture();
        let unnamed = request(1, "", tcp(80));
        assert!(matches!(
            fx.frm.install_flow_entry(&unnamed),
            Err(FrmError::InvalidArgument(_))
        ));

        fx.frm.install_flow_entry(&request(1, "web", tcp(80))).unwrap();
        let clash = request(1, "other", tcp(80));
        assert_eq!(
            fx.frm.install_flow_entry(&clash),
            Err(FrmError::Conflict(ConflictKind::DuplicateMatch))
        );
        // same match on another node, or another priority, is fine
        fx.frm.install_flow_entry(&request(2, "other", tcp(80))).unwrap();
        let mut prio = request(1, "prio", tcp(80));
        prio.flow.priority = 20;
        fx.frm.install_flow_entry(&prio).unwrap();
        assert_eq!(fx.programmer.count(CallKind::Add), 3);
        check_in_sync(&fx);
    }

    #[test]
    fn fan_out_over_container_flows() {
        let fx = fixture();
        slice(&fx, &[10, 20]);
        let web = request(1, "web", tcp(80)).with_group("apps");
        let report = fx.frm.install_flow_entry(&web).unwrap();
        assert_eq!(report.succeeded(), 2);
        assert_eq!(fx.frm.get_flow_entries_for_group("apps"), vec![web.clone()]);
        let installed = fx.frm.get_installed_flow_entries_for_group("apps");
        assert_eq!(installed.len(), 2);
        assert!(installed.iter().all(|e| e.flow.matching.dl_vlan.is_some()));
        check_in_sync(&fx);

        fx.frm.uninstall_flow_entry(&web).unwrap();
        assert!(fx.frm.get_installed_flow_entries_for_group("apps").is_empty());
        check_in_sync(&fx);
    }

    #[test]
    fn no_container_flow_allows_request() {
        let fx = fixture();
        slice(&fx, &[10]);
        let other = request(1, "other", Match::any().with_dl_vlan(30));
        assert!(fx.frm.check_flow_entry_conflict(&other));
        assert_eq!(
            fx.frm.install_flow_entry(&other),
            Err(FrmError::Conflict(ConflictKind::NoContainerFlowMatch))
        );
        assert!(!fx.frm.check_flow_entry_conflict(&request(1, "web", tcp(80))));
        assert_eq!(fx.programmer.count(CallKind::Add), 0);
    }

    #[test]
    fn hardware_failures() {
        let fx = fixture();
        fx.programmer.fail_always(CallKind::Add);
        let web = request(1, "web", tcp(80));
        assert!(matches!(
            fx.frm.install_flow_entry(&web),
            Err(FrmError::Hardware(_))
        ));
        assert!(fx.frm.engine().database().is_empty());
        fx.programmer.heal();

        // one install entry out of two fails: the request is installed
        slice(&fx, &[10, 20]);
        fx.programmer.fail_nth(CallKind::Add, 1);
        let report = fx.frm.install_flow_entry(&web).unwrap();
        assert_eq!(report.succeeded(), 1);
        assert_eq!(report.count(|o| matches!(o, Outcome::Failed(_))), 1);
        check_in_sync(&fx);
    }

    #[test]
    fn failed_removal_keeps_entry() {
        let fx = fixture();
        let web = request(1, "web", tcp(80));
        fx.frm.install_flow_entry(&web).unwrap();
        fx.programmer.fail_nth(CallKind::Remove, 1);
        assert!(matches!(
            fx.frm.uninstall_flow_entry(&web),
            Err(FrmError::Hardware(_))
        ));
        let entry = fx.frm.engine().find_match(&web, false).unwrap();
        assert_eq!(entry.status(), EntryStatus::Installed);
        check_in_sync(&fx);

        fx.frm.uninstall_flow_entry(&web).unwrap();
        check_in_sync(&fx);
    }

    #[test]
    fn unchanged_modify_is_noop() {
        let fx = fixture();
        let web = request(1, "web", tcp(80));
        fx.frm.install_flow_entry(&web).unwrap();
        fx.programmer.clear();
        let before = snapshot(&fx);
        fx.frm.modify_flow_entry(&web, &web.clone()).unwrap();
        assert!(fx.programmer.calls().is_empty());
        assert_eq!(snapshot(&fx), before);
    }

    #[test]
    fn modify_in_place() {
        let fx = fixture();
        let web = request(1, "web", tcp(80));
        fx.frm.install_flow_entry(&web).unwrap();

        let mut flow = web.flow.clone();
        flow.actions = vec![Action::Output(port(1, 7))];
        let new = web.with_flow(flow);
        let report = fx.frm.modify_flow_entry(&web, &new).unwrap();
        assert_eq!(report.count(|o| *o == Outcome::Modified), 1);
        assert_eq!(fx.programmer.count(CallKind::Modify), 1);
        assert_eq!(fx.programmer.count(CallKind::Remove), 0);
        assert_eq!(fx.programmer.table(&node(1)), vec![new.flow.clone()]);
        check_in_sync(&fx);

        let renamed = request(1, "other", tcp(80));
        assert!(matches!(
            fx.frm.modify_flow_entry(&new, &renamed),
            Err(FrmError::InvalidArgument(_))
        ));
    }

    #[test]
    fn modify_into_another_match_conflicts() {
        let fx = fixture();
        let web = request(1, "web", tcp(80));
        let ssh = request(1, "ssh", tcp(22));
        fx.frm.install_flow_entry(&web).unwrap();
        fx.frm.install_flow_entry(&ssh).unwrap();
        let moved = ssh.with_flow(web.flow.clone());
        assert_eq!(
            fx.frm.modify_flow_entry(&ssh, &moved),
            Err(FrmError::Conflict(ConflictKind::DuplicateMatch))
        );
        check_in_sync(&fx);
    }

    #[test]
    fn modify_changing_fan_out_decouples() {
        let fx = fixture();
        slice(&fx, &[10, 20]);
        let any = request(1, "any", Match::any());
        fx.frm.install_flow_entry(&any).unwrap();
        assert_eq!(fx.frm.engine().database().len(), 2);
        fx.programmer.clear();

        // only vlan 10 allows the new request
        let narrowed = any.with_flow(any.flow.with_match(Match::any().with_dl_vlan(10)));
        fx.frm.modify_flow_entry(&any, &narrowed).unwrap();
        assert_eq!(fx.frm.engine().database().len(), 1);
        assert_eq!(fx.programmer.count(CallKind::Modify), 0);
        assert_eq!(fx.programmer.count(CallKind::Remove), 2);
        assert_eq!(fx.programmer.count(CallKind::Add), 1);
        check_in_sync(&fx);

        // same result as removing the current request and adding the new one
        let other = fixture();
        slice(&other, &[10, 20]);
        other.frm.install_flow_entry(&any).unwrap();
        other.frm.uninstall_flow_entry(&any).unwrap();
        other.frm.install_flow_entry(&narrowed).unwrap();
        assert_eq!(snapshot(&fx), snapshot(&other));
        assert_eq!(
            fx.programmer.table(&node(1)),
            other.programmer.table(&node(1))
        );
    }

    #[test]
    fn modify_rolls_back_on_failure() {
        let fx = fixture();
        slice(&fx, &[10, 20]);
        let web = request(1, "web", tcp(80));
        fx.frm.install_flow_entry(&web).unwrap();
        let before = snapshot(&fx);
        let table = fx.programmer.table(&node(1));

        let mut flow = web.flow.clone();
        flow.actions = vec![Action::Drop];
        let new = web.with_flow(flow);
        fx.programmer.fail_nth(CallKind::Modify, 2);
        assert!(matches!(
            fx.frm.modify_flow_entry(&web, &new),
            Err(FrmError::Hardware(_))
        ));
        // two attempts and one rollback
        assert_eq!(fx.programmer.count(CallKind::Modify), 3);
        assert_eq!(snapshot(&fx), before);
        assert_eq!(fx.programmer.table(&node(1)), table);
        check_in_sync(&fx);
    }

    /// Modify a request fanned out over three vlans, the `failing`-th pair failing
    fn three_way_modify(failing: usize) -> (Fixture, Result<(), FrmError>) {
        let fx = fixture();
        slice(&fx, &[10, 20, 30]);
        let web = request(1, "web", tcp(80));
        fx.frm.install_flow_entry(&web).unwrap();
        let mut flow = web.flow.clone();
        flow.actions = vec![Action::Drop];
        let new = web.with_flow(flow);
        fx.programmer.fail_nth(CallKind::Modify, failing);
        let result = fx.frm.modify_flow_entry(&web, &new).map(drop);
        (fx, result)
    }

    #[test]
    fn rollback_restores_every_modified_pair() {
        for failing in [2, 3] {
            let reference = fixture();
            slice(&reference, &[10, 20, 30]);
            reference
                .frm
                .install_flow_entry(&request(1, "web", tcp(80)))
                .unwrap();

            let (fx, result) = three_way_modify(failing);
            assert!(matches!(result, Err(FrmError::Hardware(_))));
            // the pairs after the failing one are never attempted, the ones before
            // are reverted
            let attempted = failing;
            let reverted = failing - 1;
            assert_eq!(fx.programmer.count(CallKind::Modify), attempted + reverted);
            assert_eq!(snapshot(&fx), snapshot(&reference));
            let mut table = fx.programmer.table(&node(1));
            let mut expected = reference.programmer.table(&node(1));
            table.sort_by_key(ToString::to_string);
            expected.sort_by_key(ToString::to_string);
            assert_eq!(table, expected);
            check_in_sync(&fx);
        }
    }

    #[traced_test]
    #[test]
    fn failed_rollback_is_internal_error() {
        let fx = fixture();
        slice(&fx, &[10, 20]);
        let web = request(1, "web", tcp(80));
        fx.frm.install_flow_entry(&web).unwrap();

        let mut flow = web.flow.clone();
        flow.actions = vec![Action::Drop];
        let new = web.with_flow(flow);
        fx.programmer.fail_nth(CallKind::Modify, 2);
        fx.programmer.fail_nth(CallKind::Modify, 3);
        assert!(matches!(
            fx.frm.modify_flow_entry(&web, &new),
            Err(FrmError::Internal(_))
        ));
        assert!(logs_contain("Failed to roll back"));
        // the software view still tells what the nodes have
        check_in_sync(&fx);
    }

    #[test]
    fn modify_or_add() {
        let fx = fixture();
        let web = request(1, "web", tcp(80));
        fx.frm.modify_or_add_flow_entry(&web).unwrap();
        assert_eq!(fx.programmer.count(CallKind::Add), 1);

        let mut flow = web.flow.clone();
        flow.actions.push(Action::Output(port(1, 2)));
        let new = web.with_flow(flow);
        fx.frm.modify_or_add_flow_entry(&new).unwrap();
        assert_eq!(fx.programmer.count(CallKind::Add), 1);
        assert_eq!(fx.programmer.count(CallKind::Modify), 1);
        check_in_sync(&fx);
    }

    #[traced_test]
    #[test]
    fn container_mode_round_trip() {
        let fx = fixture();
        let web = request(1, "web", tcp(80));
        let ssh = request(2, "ssh", tcp(22));
        fx.frm.install_flow_entry(&web).unwrap();
        fx.frm.install_flow_entry(&ssh).unwrap();
        let before = snapshot(&fx);

        fx.frm.container_mode_updated(UpdateType::Added);
        assert!(fx.frm.in_container_mode());
        assert!(fx.frm.engine().database().is_empty());
        assert_eq!(fx.frm.coordinator().archived().len(), 2);
        assert_eq!(
            fx.frm.install_flow_entry(&request(1, "dns", tcp(53))),
            Err(FrmError::Conflict(ConflictKind::ContainerMode))
        );
        assert_eq!(
            fx.frm.modify_or_add_flow_entry(&web),
            Err(FrmError::Conflict(ConflictKind::ContainerMode))
        );
        // entering twice changes nothing
        fx.frm.container_mode_updated(UpdateType::Added);
        assert_eq!(fx.frm.coordinator().archived().len(), 2);

        fx.frm.container_mode_updated(UpdateType::Removed);
        assert!(!fx.frm.in_container_mode());
        assert!(fx.frm.coordinator().archived().is_empty());
        assert_eq!(snapshot(&fx), before);
        check_in_sync(&fx);
        assert!(logs_contain("Entering container mode"));
    }

    #[test]
    fn uninstall_in_container_mode_is_not_reinstalled() {
        let fx = fixture();
        let web = request(1, "web", tcp(80)).with_group("g");
        let ssh = request(1, "ssh", tcp(22)).with_group("g");
        let dns = request(1, "dns", tcp(53));
        for r in [&web, &ssh, &dns] {
            fx.frm.install_flow_entry(r).unwrap();
        }
        fx.frm.container_mode_updated(UpdateType::Added);
        fx.frm.uninstall_flow_entry(&dns).unwrap();
        fx.frm.uninstall_flow_entry_group("g").unwrap();
        assert!(fx.frm.coordinator().archived().is_empty());
        fx.frm.container_mode_updated(UpdateType::Removed);
        assert!(fx.frm.engine().database().is_empty());
        check_in_sync(&fx);
    }

    #[test]
    fn container_flow_change_migrates_entries() {
        let fx = fixture();
        let web = request(1, "web", tcp(80));
        fx.frm.install_flow_entry(&web).unwrap();

        slice(&fx, &[10]);
        fx.frm
            .container_flow_updated(&vlan(10), &vlan(10), UpdateType::Added);
        let entries = fx.frm.engine().database().all_entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].original(), &web);
        assert_eq!(entries[0].flow().matching.dl_vlan, Some(10));
        check_in_sync(&fx);

        slice(&fx, &[10, 20]);
        fx.frm
            .container_flow_updated(&vlan(20), &vlan(20), UpdateType::Added);
        assert_eq!(fx.frm.engine().database().len(), 2);
        check_in_sync(&fx);
    }

    #[test]
    fn group_operations() {
        let fx = fixture();
        let web = request(1, "web", tcp(80)).with_group("g");
        let ssh = request(2, "ssh", tcp(22)).with_group("g");
        let dns = request(1, "dns", tcp(53)).with_group("h");
        for r in [&web, &ssh, &dns] {
            fx.frm.install_flow_entry(r).unwrap();
        }
        assert_eq!(fx.frm.get_flow_entries_for_group("g"), vec![web, ssh]);
        fx.frm.uninstall_flow_entry_group("g").unwrap();
        assert!(fx.frm.get_flow_entries_for_group("g").is_empty());
        assert_eq!(fx.frm.get_flow_entries_for_group("h"), vec![dns]);
        check_in_sync(&fx);
    }

    #[test]
    fn static_flows_group_is_not_uninstalled_as_group() {
        let fx = fixture();
        let n1 = node(1);
        fx.frm.add_static_flow(static_flow(1, "web", 80), false).unwrap();
        assert!(matches!(
            fx.frm.uninstall_flow_entry_group(STATIC_FLOWS_GROUP),
            Err(FrmError::InvalidArgument(_))
        ));
        assert!(matches!(
            fx.frm.uninstall_flow_entry_group(""),
            Err(FrmError::InvalidArgument(_))
        ));
        assert_eq!(fx.programmer.count(CallKind::Remove), 0);
        assert_eq!(fx.frm.get_flow_entries_for_group(STATIC_FLOWS_GROUP).len(), 1);
        let web = fx.frm.get_static_flow("web", &n1).unwrap();
        assert!(web.install_in_hw);
        assert_eq!(web.status, STATUS_SUCCESS);
        check_in_sync(&fx);
    }

    #[test]
    fn output_ports() {
        let fx = fixture();
        let web = request(1, "web", tcp(80));
        fx.frm.install_flow_entry(&web).unwrap();
        let n1 = node(1);
        assert_eq!(fx.frm.get_output_port(&n1, "web"), Some(port(1, 1)));

        fx.frm.add_output_port(&n1, "web", &[port(1, 2), port(1, 3)]).unwrap();
        fx.frm.replace_output_port(&n1, "web", &port(1, 4)).unwrap();
        let installed = fx.frm.engine().find_match(&web, true).unwrap();
        assert_eq!(
            installed.flow().output_ports().cloned().collect::<Vec<_>>(),
            vec![port(1, 2), port(1, 3), port(1, 4)]
        );
        assert_eq!(fx.frm.get_output_port(&n1, "web"), Some(port(1, 2)));

        fx.frm.remove_output_port(&n1, "web", &[port(1, 2)]).unwrap();
        assert_eq!(fx.frm.get_output_port(&n1, "web"), Some(port(1, 3)));

        assert!(matches!(
            fx.frm.add_output_port(&n1, "nope", &[port(1, 2)]),
            Err(FrmError::NotFound(_))
        ));
        assert_eq!(fx.frm.get_output_port(&node(2), "web"), None);
        check_in_sync(&fx);
    }

    #[test]
    fn concurrent_identical_adds_install_once() {
        let fx = fixture();
        fx.programmer.set_delay(Some(Duration::from_millis(5)));
        let web = request(1, "web", tcp(80));
        let results: Vec<_> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| s.spawn(|| fx.frm.install_flow_entry(&web)))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(
            results
                .iter()
                .filter_map(|r| r.as_ref().err())
                .all(FrmError::is_conflict)
        );
        assert_eq!(fx.programmer.count(CallKind::Add), 1);
        assert_eq!(fx.frm.engine().database().reservation_count(), 0);
        check_in_sync(&fx);
    }

    fn static_flow(n: u64, name: &str, dport: u16) -> StaticFlow {
        StaticFlow::new(
            name,
            node(n),
            Flow::new(tcp(dport), vec![Action::Output(port(n, 1))]).with_priority(100),
        )
    }

    #[test]
    fn static_flows() {
        let fx = fixture();
        let n1 = node(1);
        fx.frm.add_static_flow(static_flow(1, "web", 80), false).unwrap();
        fx.frm
            .add_static_flow(static_flow(1, "ssh", 22).with_install_in_hw(false), false)
            .unwrap();
        assert_eq!(fx.programmer.count(CallKind::Add), 1);
        assert_eq!(
            fx.frm.add_static_flow(static_flow(1, "web", 8080), false),
            Err(FrmError::Conflict(ConflictKind::StaticFlowExists))
        );
        assert!(matches!(
            fx.frm.add_static_flow(static_flow(1, "**mine", 8080), false),
            Err(FrmError::InvalidArgument(_))
        ));
        let mut invalid = static_flow(1, "bad", 8080);
        invalid.flow.actions.clear();
        assert!(matches!(
            fx.frm.add_static_flow(invalid, false),
            Err(FrmError::InvalidArgument(_))
        ));
        assert_eq!(fx.frm.get_static_flow_names_for_node(&n1), vec!["web", "ssh"]);
        assert_eq!(
            fx.frm.get_static_flow("web", &n1).unwrap().status,
            STATUS_SUCCESS
        );

        // toggle installs and uninstalls
        fx.frm.toggle_static_flow_status("ssh", &n1).unwrap();
        assert!(fx.frm.get_static_flow("ssh", &n1).unwrap().install_in_hw);
        assert_eq!(fx.frm.engine().database().len(), 2);
        fx.frm.toggle_static_flow_status("web", &n1).unwrap();
        assert!(!fx.frm.get_static_flow("web", &n1).unwrap().install_in_hw);
        assert_eq!(fx.frm.engine().database().len(), 1);
        check_in_sync(&fx);

        // modify
        fx.programmer.clear();
        fx.frm.modify_static_flow(static_flow(1, "ssh", 22)).unwrap();
        assert!(fx.programmer.calls().is_empty());
        fx.frm.modify_static_flow(static_flow(1, "ssh", 2222)).unwrap();
        assert_eq!(fx.programmer.count(CallKind::Modify), 1);
        assert_eq!(
            fx.frm.get_static_flow("ssh", &n1).unwrap().flow.matching.tp_dst,
            Some(2222)
        );
        assert!(matches!(
            fx.frm.modify_static_flow(static_flow(1, "nope", 22)),
            Err(FrmError::NotFound(_))
        ));
        check_in_sync(&fx);

        // remove
        assert!(matches!(
            fx.frm.remove_static_flow("nope", &n1),
            Err(FrmError::NotFound(_))
        ));
        fx.frm.remove_static_flow("ssh", &n1).unwrap();
        fx.frm.remove_static_flow("web", &n1).unwrap();
        assert!(fx.frm.get_static_flows().is_empty());
        assert!(fx.frm.engine().database().is_empty());
        check_in_sync(&fx);
    }

    #[test]
    fn static_flow_restore() {
        let fx = fixture();
        fx.programmer.disconnect(&node(1));
        assert!(matches!(
            fx.frm.add_static_flow(static_flow(1, "web", 80), false),
            Err(FrmError::Hardware(_))
        ));
        assert!(fx.frm.get_static_flows().is_empty());

        // a restored configuration is kept, with the failure as status
        fx.frm.add_static_flow(static_flow(1, "web", 80), true).unwrap();
        let stored = fx.frm.get_static_flow("web", &node(1)).unwrap();
        assert_ne!(stored.status, STATUS_SUCCESS);

        // and installed when the node shows up
        fx.programmer.connect(&node(1));
        fx.frm.notify_node(&node(1), UpdateType::Added, &[]);
        let stored = fx.frm.get_static_flow("web", &node(1)).unwrap();
        assert_eq!(stored.status, STATUS_SUCCESS);
        check_in_sync(&fx);
    }

    #[test]
    fn port_removal_and_addition() {
        let fx = fixture();
        let n1 = node(1);
        fx.frm.add_static_flow(static_flow(1, "web", 80), false).unwrap();
        fx.frm.install_flow_entry(&request(1, "dns", tcp(53))).unwrap();
        let ssh = FlowEntry::new(
            n1.clone(),
            "ssh",
            Flow::new(tcp(22), vec![Action::Output(port(1, 2))]).with_priority(10),
        );
        fx.frm.install_flow_entry(&ssh).unwrap();
        fx.programmer.clear();

        fx.frm
            .notify_node_connector(&port(1, 1), UpdateType::Removed, &[]);
        assert_eq!(fx.programmer.count(CallKind::Remove), 2);
        let db = fx.frm.engine().database();
        assert_eq!(db.len(), 1);
        assert!(db.find_by_name(&n1, "ssh").is_some());
        drop(db);
        let web = fx.frm.get_static_flow("web", &n1).unwrap();
        assert!(web.install_in_hw);
        assert_eq!(web.status, STATUS_PORT_REMOVED);
        check_in_sync(&fx);

        // a port of another node is not used by anything
        fx.frm
            .notify_node_connector(&port(2, 1), UpdateType::Removed, &[]);
        assert_eq!(fx.programmer.count(CallKind::Remove), 2);

        fx.frm
            .notify_node_connector(&port(1, 1), UpdateType::Added, &[]);
        assert_eq!(fx.programmer.count(CallKind::Add), 1);
        assert_eq!(
            fx.frm.get_static_flow("web", &n1).unwrap().status,
            STATUS_SUCCESS
        );
        assert_eq!(fx.frm.engine().database().len(), 2);
        check_in_sync(&fx);

        // already installed
        fx.frm
            .notify_node_connector(&port(1, 1), UpdateType::Added, &[]);
        assert_eq!(fx.programmer.count(CallKind::Add), 1);
    }

    #[test]
    fn flow_removed_by_node() {
        let fx = fixture();
        let n1 = node(1);
        let web = static_flow(1, "web", 80);
        fx.frm.add_static_flow(web.clone(), false).unwrap();
        let dns = request(1, "dns", tcp(53));
        fx.frm.install_flow_entry(&dns).unwrap();

        assert!(fx.programmer.expire(&n1, &web.flow));
        fx.frm.flow_removed(&n1, &web.flow);
        assert_eq!(fx.frm.engine().database().len(), 1);
        let stored = fx.frm.get_static_flow("web", &n1).unwrap();
        assert!(!stored.install_in_hw);
        assert_eq!(stored.status, STATUS_SUCCESS);
        check_in_sync(&fx);

        // unknown flows are ignored
        fx.frm.flow_removed(&n1, &request(1, "other", tcp(9)).flow);
        assert_eq!(fx.frm.engine().database().len(), 1);

        assert!(fx.programmer.expire(&n1, &dns.flow));
        fx.frm.flow_removed(&n1, &dns.flow);
        assert!(fx.frm.engine().database().is_empty());
        check_in_sync(&fx);

        // the static flow can be installed again
        fx.frm.toggle_static_flow_status("web", &n1).unwrap();
        assert_eq!(fx.frm.engine().database().len(), 1);
        check_in_sync(&fx);
    }

    #[traced_test]
    #[test]
    fn default_flows_and_node_removal() {
        let fx = fixture();
        let n1 = node(1);
        fx.frm.mode_change_notify(&n1, true);
        assert_eq!(fx.frm.get_static_flows_for_node(&n1).len(), 3);
        assert_eq!(fx.programmer.count(CallKind::Add), 3);
        let drop = fx.frm.get_static_flow(CATCH_ALL_DROP_FLOW, &n1).unwrap();
        assert_eq!(drop.flow.priority, 0);
        assert_eq!(
            fx.frm.remove_static_flow(PUNT_ARP_FLOW, &n1),
            Err(FrmError::NotAcceptable(format!("flow '{PUNT_ARP_FLOW}' is internal")))
        );
        // idempotent
        fx.frm.mode_change_notify(&n1, true);
        assert_eq!(fx.frm.get_static_flows_for_node(&n1).len(), 3);

        fx.frm.add_static_flow(static_flow(1, "web", 80), false).unwrap();
        fx.frm.install_flow_entry(&request(1, "dns", tcp(53))).unwrap();
        fx.programmer.clear();

        fx.frm.notify_node(&n1, UpdateType::Removed, &[]);
        assert!(fx.frm.engine().database().is_empty());
        assert!(fx.programmer.calls().is_empty());
        let remaining = fx.frm.get_static_flows_for_node(&n1);
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].status, STATUS_NODE_DOWN);
        assert_eq!(fx.frm.get_nodes_with_configured_flows(), vec![n1.clone()]);

        fx.frm.notify_node(&n1, UpdateType::Added, &[]);
        assert_eq!(fx.programmer.count(CallKind::Add), 1);
        assert_eq!(
            fx.frm.get_static_flow("web", &n1).unwrap().status,
            STATUS_SUCCESS
        );

        fx.frm.mode_change_notify(&n1, true);
        fx.frm.mode_change_notify(&n1, false);
        assert_eq!(fx.frm.get_static_flow_names_for_node(&n1), vec!["web"]);
        assert!(logs_contain("switched to reactive mode"));
    }

    #[test]
    fn static_flow_status_in_container_mode() {
        let fx = fixture();
        fx.frm.add_static_flow(static_flow(1, "web", 80), false).unwrap();
        fx.frm.container_mode_updated(UpdateType::Added);
        let stored = fx.frm.get_static_flow("web", &node(1)).unwrap();
        assert_eq!(stored.status, STATUS_CONTAINER_MODE);
        assert!(fx.frm.engine().database().is_empty());

        fx.frm.container_mode_updated(UpdateType::Removed);
        let stored = fx.frm.get_static_flow("web", &node(1)).unwrap();
        assert_eq!(stored.status, STATUS_SUCCESS);
        assert_eq!(fx.frm.engine().database().len(), 1);
        check_in_sync(&fx);
    }

    #[test]
    fn internal_flows_survive_container_mode() {
        let fx = fixture();
        let n1 = node(1);
        fx.frm.mode_change_notify(&n1, true);
        fx.frm.add_static_flow(static_flow(1, "web", 80), false).unwrap();
        fx.frm.install_flow_entry(&request(1, "dns", tcp(53))).unwrap();
        assert_eq!(fx.frm.engine().database().len(), 5);

        fx.frm.container_mode_updated(UpdateType::Added);
        assert_eq!(fx.frm.engine().database().len(), 3);
        assert_eq!(fx.programmer.table_size(), 3);
        assert_eq!(fx.frm.coordinator().archived().len(), 2);
        assert_eq!(
            fx.frm.get_static_flow(PUNT_LLDP_FLOW, &n1).unwrap().status,
            STATUS_SUCCESS
        );
        assert_eq!(
            fx.frm.get_static_flow("web", &n1).unwrap().status,
            STATUS_CONTAINER_MODE
        );
        check_in_sync(&fx);

        fx.frm.container_mode_updated(UpdateType::Removed);
        assert_eq!(fx.frm.engine().database().len(), 5);
        assert_eq!(
            fx.frm.get_static_flow("web", &n1).unwrap().status,
            STATUS_SUCCESS
        );
        check_in_sync(&fx);
    }

    #[test]
    fn default_flows_in_container_mode() {
        let fx = fixture();
        let n1 = node(1);
        fx.frm.container_mode_updated(UpdateType::Added);
        fx.frm.mode_change_notify(&n1, true);
        assert_eq!(fx.frm.get_static_flows_for_node(&n1).len(), 3);
        assert_eq!(fx.frm.engine().database().len(), 3);
        assert_eq!(fx.programmer.count(CallKind::Add), 3);
        assert!(
            fx.frm
                .get_static_flows_for_node(&n1)
                .iter()
                .all(|config| config.status == STATUS_SUCCESS)
        );
        check_in_sync(&fx);

        // user requests are still refused
        assert_eq!(
            fx.frm.install_flow_entry(&request(1, "dns", tcp(53))),
            Err(FrmError::Conflict(ConflictKind::ContainerMode))
        );

        fx.frm.mode_change_notify(&n1, false);
        assert!(fx.frm.get_static_flows().is_empty());
        assert!(fx.frm.engine().database().is_empty());
        check_in_sync(&fx);
    }

    #[test]
    fn manager_checks_params() {
        let programmer = Arc::new(MockProgrammer::new());
        let blue = FrmParamsBuilder::default()
            .container_name("blue")
            .build()
            .unwrap();
        assert!(matches!(
            ForwardingRulesManager::new(
                blue.clone(),
                programmer.clone(),
                Arc::new(ContainerView::default())
            ),
            Err(ParamsError::Invalid(_))
        ));
        let matching = ForwardingRulesManager::new(
            blue,
            programmer.clone(),
            Arc::new(ContainerView::new("blue")),
        );
        assert!(matching.is_ok());

        let flat = FrmParamsBuilder::default()
            .punt_priority(0)
            .build()
            .unwrap();
        assert!(matches!(
            ForwardingRulesManager::new(flat, programmer, Arc::new(ContainerView::default())),
            Err(ParamsError::Invalid(_))
        ));
    }

    /// Purges the node from the engine while a flow is being added to it
    #[derive(Default)]
    struct PurgingProgrammer {
        engine: OnceLock<Weak<FlowEngine>>,
    }

    impl FlowProgrammer for PurgingProgrammer {
        fn add_flow(&self, node: &Node, _flow: &Flow) -> Result<(), ProgrammerError> {
            if let Some(engine) = self.engine.get().and_then(Weak::upgrade) {
                engine.purge_node(node);
            }
            Ok(())
        }
        fn remove_flow(&self, _node: &Node, _flow: &Flow) -> Result<(), ProgrammerError> {
            Ok(())
        }
        fn modify_flow(
            &self,
            _node: &Node,
            _old: &Flow,
            _new: &Flow,
        ) -> Result<(), ProgrammerError> {
            Ok(())
        }
    }

    #[traced_test]
    #[test]
    fn node_going_away_during_add() {
        let programmer = Arc::new(PurgingProgrammer::default());
        let engine = Arc::new(FlowEngine::new(
            programmer.clone(),
            Arc::new(ContainerView::default()),
        ));
        assert!(programmer.engine.set(Arc::downgrade(&engine)).is_ok());

        let report = engine.add(&request(1, "web", tcp(80))).unwrap();
        assert_eq!(report.outcomes().len(), 1);
        assert_eq!(
            report.outcomes()[0].outcome,
            Outcome::Skipped(SkipReason::NodeGone)
        );
        let db = engine.database();
        assert!(db.is_empty());
        assert_eq!(db.reservation_count(), 0);
        db.check_consistency().unwrap();
        assert!(logs_contain("went away while installing"));
    }

    #[test]
    fn display() {
        let fx = fixture();
        fx.frm.add_static_flow(static_flow(1, "web", 80), false).unwrap();
        let out = fx.frm.to_string();
        assert!(out.contains("installed flow entries (1)"));
        assert!(out.contains("static flows (1)"));
    }

    /// Random operation sequences keep the database consistent and in sync with the nodes
    #[test]
    fn random_operations_keep_database_consistent() {
        bolero::check!()
            .with_type::<Vec<(u8, u8, u8)>>()
            .for_each(|ops| {
                let fx = fixture();
                for (op, slot, value) in ops.iter().take(48) {
                    let n = u64::from(slot % 2) + 1;
                    let name = format!("f{}", slot % 4);
                    let matching = Match::any().with_tp_dst(u16::from(value % 4));
                    let req = request(n, &name, matching);
                    match op % 6 {
                        0 => {
                            let _ = fx.frm.install_flow_entry(&req);
                        }
                        1 => {
                            let _ = fx.frm.uninstall_flow_entry(&req);
                        }
                        2 => {
                            let current = fx
                                .frm
                                .engine()
                                .database()
                                .find_by_name(&node(n), &name)
                                .map(|e| e.original().clone());
                            if let Some(current) = current {
                                let _ = fx.frm.modify_flow_entry(&current, &req);
                            }
                        }
                        3 => {
                            let _ = fx.frm.modify_or_add_flow_entry(&req);
                        }
                        4 => {
                            let vlans: Vec<u16> =
                                (0..3).filter(|v| (value >> v) & 1 == 1).collect();
                            slice(&fx, &vlans);
                            fx.frm
                                .container_flow_updated(&vlan(0), &vlan(0), UpdateType::Changed);
                        }
                        _ => {
                            let update = if value % 2 == 0 {
                                UpdateType::Added
                            } else {
                                UpdateType::Removed
                            };
                            fx.frm.container_mode_updated(update);
                        }
                    }
                    check_in_sync(&fx);
                    assert_eq!(fx.frm.engine().database().reservation_count(), 0);
                }
            });
    }
}
