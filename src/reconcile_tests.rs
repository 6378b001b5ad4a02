// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for per-zone reconciliation.

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use hickory_proto::rr::RecordType;
    use regex::Regex;
    use tokio::sync::Mutex;

    use crate::provisioner::{OwnerFlags, Provisioner};
    use crate::reconcile::{reconcile_zone, ReconcileError};
    use crate::zone::Zone;
    use crate::zonefile::parse_zone_data;

    const REMOTE: &str = "thing.example.com.\t10\tIN\tA\t8.8.8.8 ; comment=1
$TTL 86400
@   IN  SOA example.com. root.example.com. (
\t\t100   ;Serial
\t\t3600  ;Refresh
\t\t1800  ;Retry
\t  6048      ;Expire
    8640      ;Minimum TTL
)

thing.example.com.\t10\tIN\tA\t6.6.6.6
thing2.example.com.\t10\tIN\tA\t5.5.5.5
thing.example.com.\t10\tIN\tA\t7.7.7.7 ; setID=1 comment=1
thing.example.com.\t10\tIN\tA\t8.8.8.8 ; setID=1 comment=2
thing.example.com.\t10\tIN\tA\t10.10.10.10";

    #[derive(Debug)]
    struct UpdateCall {
        wanted: Zone,
        unwanted: Zone,
    }

    struct TestProvisioner {
        remote: Result<Zone, String>,
        group_flags: Vec<String>,
        owner_flags: OwnerFlags,
        updates: Mutex<Vec<UpdateCall>>,
    }

    impl TestProvisioner {
        fn new(remote: &str) -> Self {
            TestProvisioner {
                remote: Ok(parse_zone_data(remote).expect("remote zone parses")),
                group_flags: vec!["setID".to_string(), "country".to_string()],
                owner_flags: OwnerFlags::default(),
                updates: Mutex::new(Vec::new()),
            }
        }

        fn failing(message: &str) -> Self {
            TestProvisioner {
                remote: Err(message.to_string()),
                group_flags: Vec::new(),
                owner_flags: OwnerFlags::default(),
                updates: Mutex::new(Vec::new()),
            }
        }

        fn with_owner_flags(mut self, flags: &[(&str, &str)]) -> Self {
            let map: BTreeMap<String, Regex> = flags
                .iter()
                .map(|(k, v)| ((*k).to_string(), Regex::new(v).expect("test regex compiles")))
                .collect();
            self.owner_flags = OwnerFlags::new(map);
            self
        }

        async fn update_count(&self) -> usize {
            self.updates.lock().await.len()
        }
    }

    #[async_trait]
    impl Provisioner for TestProvisioner {
        async fn remote_zone(&self) -> Result<Zone> {
            match &self.remote {
                Ok(zone) => Ok(zone.clone()),
                Err(message) => Err(anyhow!("{message}")),
            }
        }

        fn group_flags(&self) -> &[String] {
            &self.group_flags
        }

        fn owner_flags(&self) -> &OwnerFlags {
            &self.owner_flags
        }

        async fn update_zone(
            &self,
            wanted: &Zone,
            unwanted: &Zone,
            _desired: &Zone,
            _remote: &Zone,
        ) -> Result<()> {
            self.updates.lock().await.push(UpdateCall {
                wanted: wanted.clone(),
                unwanted: unwanted.clone(),
            });
            Ok(())
        }
    }

    fn soa_serials(zone: &Zone) -> Vec<u32> {
        zone.iter()
            .filter(|r| r.rrtype == RecordType::SOA)
            .map(|r| r.soa_serial().expect("serial parses"))
            .collect()
    }

    // Desired equal to remote minus the SOA reconciles to a no-op: no
    // update call, serial untouched.
    #[tokio::test]
    async fn test_reconcile_noop() {
        let desired: Zone = parse_zone_data(REMOTE)
            .expect("zone parses")
            .into_iter()
            .filter(|r| r.rrtype != RecordType::SOA)
            .collect();

        let prov = TestProvisioner::new(REMOTE);
        let outcome = reconcile_zone(&prov, &desired).await.expect("reconcile succeeds");

        assert!(!outcome.changed);
        assert_eq!(outcome.old_serial, 100);
        assert_eq!(outcome.new_serial, 100);
        assert_eq!(prov.update_count().await, 0);
    }

    // One new desired record produces a change set of exactly that record
    // plus the SOA bump pair.
    #[tokio::test]
    async fn test_reconcile_additive() {
        let mut desired: Zone = parse_zone_data(REMOTE)
            .expect("zone parses")
            .into_iter()
            .filter(|r| r.rrtype != RecordType::SOA)
            .collect();
        let added = parse_zone_data("new.example.com. 10 IN A 1.2.3.4\n")
            .expect("zone parses");
        desired.extend(added.clone());

        let prov = TestProvisioner::new(REMOTE);
        let outcome = reconcile_zone(&prov, &desired).await.expect("reconcile succeeds");

        assert!(outcome.changed);
        assert_eq!(outcome.old_serial, 100);
        assert_eq!(outcome.new_serial, 101);

        let updates = prov.updates.lock().await;
        assert_eq!(updates.len(), 1);
        let call = &updates[0];

        assert_eq!(call.wanted.len(), 2);
        assert_eq!(
            call.wanted.records()[0].name,
            added.records()[0].name
        );
        assert_eq!(soa_serials(&call.wanted), vec![101]);

        assert_eq!(call.unwanted.len(), 1);
        assert_eq!(soa_serials(&call.unwanted), vec![100]);

        // The SOA pair is always the final member of each side.
        assert_eq!(call.wanted.records()[1].rrtype, RecordType::SOA);
        assert_eq!(call.unwanted.records()[0].rrtype, RecordType::SOA);
    }

    // A record removed from the desired state is unwanted.
    #[tokio::test]
    async fn test_reconcile_removal() {
        let desired: Zone = parse_zone_data(REMOTE)
            .expect("zone parses")
            .into_iter()
            .filter(|r| r.rrtype != RecordType::SOA && r.rdata != "10.10.10.10")
            .collect();

        let prov = TestProvisioner::new(REMOTE);
        let outcome = reconcile_zone(&prov, &desired).await.expect("reconcile succeeds");
        assert!(outcome.changed);

        let updates = prov.updates.lock().await;
        let call = &updates[0];
        assert_eq!(soa_serials(&call.wanted), vec![101]);
        assert_eq!(call.unwanted.len(), 2);
        assert_eq!(call.unwanted.records()[0].rdata, "10.10.10.10");
    }

    const OWNED_REMOTE: &str = "$TTL 86400
@   IN  SOA example.com. root.example.com. (
\t\t100   ;Serial
\t\t3600  ;Refresh
\t\t1800  ;Retry
\t  6048      ;Expire
    8640      ;Minimum TTL
)

thing.example.com.\t10\tIN\tA\t7.7.7.7 ; setID=1
thing.example.com.\t10\tIN\tA\t8.8.8.8 ; setID=2";

    // A foreign group matching the owner flags is pruned; without owner
    // flags it is left untouched.
    #[tokio::test]
    async fn test_reconcile_prunes_owned_foreign_group() {
        let desired =
            parse_zone_data("thing.example.com. 10 IN A 8.8.8.8 ; setID=2\n").expect("zone parses");

        let prov = TestProvisioner::new(OWNED_REMOTE).with_owner_flags(&[("setID", "^1$")]);
        let outcome = reconcile_zone(&prov, &desired).await.expect("reconcile succeeds");
        assert!(outcome.changed);

        let updates = prov.updates.lock().await;
        let call = &updates[0];
        assert_eq!(soa_serials(&call.wanted), vec![101]);
        assert_eq!(call.unwanted.len(), 2);
        assert_eq!(call.unwanted.records()[0].rdata, "7.7.7.7");
        assert_eq!(call.unwanted.records()[0].flags.get("setID"), Some("1"));
    }

    #[tokio::test]
    async fn test_reconcile_leaves_foreign_group_without_owner_flags() {
        let desired =
            parse_zone_data("thing.example.com. 10 IN A 8.8.8.8 ; setID=2\n").expect("zone parses");

        let prov = TestProvisioner::new(OWNED_REMOTE);
        let outcome = reconcile_zone(&prov, &desired).await.expect("reconcile succeeds");

        assert!(!outcome.changed);
        assert_eq!(prov.update_count().await, 0);
    }

    // An owner flag whose regex does not match the foreign group leaves it
    // untouched too.
    #[tokio::test]
    async fn test_reconcile_owner_flags_must_match() {
        let desired =
            parse_zone_data("thing.example.com. 10 IN A 8.8.8.8 ; setID=2\n").expect("zone parses");

        let prov = TestProvisioner::new(OWNED_REMOTE).with_owner_flags(&[("setID", "^9$")]);
        let outcome = reconcile_zone(&prov, &desired).await.expect("reconcile succeeds");

        assert!(!outcome.changed);
        assert_eq!(prov.update_count().await, 0);
    }

    #[tokio::test]
    async fn test_reconcile_multiple_soa() {
        let remote = "$TTL 86400
example.com. IN SOA example.com. root.example.com. ( 100 3600 1800 6048 8640 )
example.com. IN SOA example.com. root.example.com. ( 200 3600 1800 6048 8640 )
thing.example.com.\t10\tIN\tA\t6.6.6.6";

        let prov = TestProvisioner::new(remote);
        let desired = parse_zone_data("thing.example.com. 10 IN A 6.6.6.6\n").expect("zone parses");

        let err = reconcile_zone(&prov, &desired).await.expect_err("reconcile fails");
        assert!(matches!(err, ReconcileError::MultipleSoa(2)));
        assert!(err.to_string().contains("multiple SOA records"), "got: {err}");
        assert_eq!(prov.update_count().await, 0);
    }

    #[tokio::test]
    async fn test_reconcile_no_soa() {
        let prov = TestProvisioner::new("thing.example.com.\t10\tIN\tA\t6.6.6.6");
        let desired = parse_zone_data("thing.example.com. 10 IN A 6.6.6.6\n").expect("zone parses");

        let err = reconcile_zone(&prov, &desired).await.expect_err("reconcile fails");
        assert!(matches!(err, ReconcileError::NoSoa));
        assert_eq!(prov.update_count().await, 0);
    }

    #[tokio::test]
    async fn test_reconcile_remote_fetch_failure() {
        let prov = TestProvisioner::failing("connection refused");
        let desired = parse_zone_data("thing.example.com. 10 IN A 6.6.6.6\n").expect("zone parses");

        let err = reconcile_zone(&prov, &desired).await.expect_err("reconcile fails");
        assert!(matches!(err, ReconcileError::RemoteZone(_)));
        assert_eq!(prov.update_count().await, 0);
    }
}
