// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! End-to-end test of the public API: a config-driven scheduler run
//! against in-memory backends.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use hickory_proto::rr::RecordType;
use prometheus::Registry;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use dubber::config::{compile_owner_flags, Config};
use dubber::discoverer::{Discoverer, StatePuller};
use dubber::metrics::Metrics;
use dubber::provisioner::{OwnerFlags, Provisioner};
use dubber::server::Server;
use dubber::template::ZoneTemplate;
use dubber::zone::Zone;
use dubber::zonefile::parse_zone_data;

struct StaticPuller(Value);

#[async_trait]
impl StatePuller for StaticPuller {
    async fn pull(&self) -> Result<Value> {
        Ok(self.0.clone())
    }
}

struct FakeBackend {
    remote: Zone,
    group_flags: Vec<String>,
    owner_flags: OwnerFlags,
    updates: Mutex<Vec<(Zone, Zone)>>,
}

struct SharedBackend(Arc<FakeBackend>);

#[async_trait]
impl Provisioner for SharedBackend {
    async fn remote_zone(&self) -> Result<Zone> {
        Ok(self.0.remote.clone())
    }

    fn group_flags(&self) -> &[String] {
        &self.0.group_flags
    }

    fn owner_flags(&self) -> &OwnerFlags {
        &self.0.owner_flags
    }

    async fn update_zone(
        &self,
        wanted: &Zone,
        unwanted: &Zone,
        _desired: &Zone,
        _remote: &Zone,
    ) -> Result<()> {
        self.0
            .updates
            .lock()
            .await
            .push((wanted.clone(), unwanted.clone()));
        Ok(())
    }
}

#[tokio::test]
async fn test_config_driven_oneshot_run() {
    // Config supplies the template and the ownership policy; the backends
    // are swapped for in-memory fakes.
    let cfg = Config::from_yaml(
        r#"
discoverers:
  marathon:
    - endpoints: [http://marathon.invalid:8080]
      template: |
        {% for id, app in applications %}{{ app.labels.dns }} 60 IN A {{ app.labels.ip }} ; setID={{ app.labels.set }}
        {% endfor %}
provisioners:
  route53:
    - zone: example.com.
      ownerFlags:
        setID: dubber-.*
"#,
    )
    .expect("config parses");
    cfg.validate_zones().expect("zones validate");

    let owner_flags = compile_owner_flags(
        "example.com.",
        &cfg.provisioners.route53[0].base.owner_flags,
    )
    .expect("owner flags compile");

    let backend = Arc::new(FakeBackend {
        remote: parse_zone_data(
            "example.com. 86400 IN SOA ns1.example.com. root.example.com. ( 7 3600 600 604800 86400 )
stale.example.com. 60 IN A 10.9.9.9 ; setID=dubber-old
",
        )
        .expect("remote parses"),
        group_flags: vec!["setID".to_string()],
        owner_flags,
        updates: Mutex::new(Vec::new()),
    });

    let mut provisioners: HashMap<String, Box<dyn Provisioner>> = HashMap::new();
    provisioners.insert(
        "example.com.".to_string(),
        Box::new(SharedBackend(backend.clone())),
    );

    let template =
        ZoneTemplate::compile(cfg.discoverers.marathon[0].template()).expect("template compiles");
    let state = json!({
        "applications": {
            "/web": {"labels": {"dns": "web.example.com.", "ip": "10.0.0.1", "set": "dubber-web"}},
        }
    });
    let discoverers = vec![Discoverer::new(
        "marathon[0]",
        template,
        Box::new(StaticPuller(state)),
    )];

    let metrics = Arc::new(Metrics::new(Registry::new()).expect("metrics register"));
    let server = Server::new(
        discoverers,
        provisioners,
        metrics.clone(),
        Duration::from_secs(3600),
        true,
    );
    server
        .run(CancellationToken::new())
        .await
        .expect("oneshot run completes");

    let updates = backend.updates.lock().await;
    assert_eq!(updates.len(), 1);
    let (wanted, unwanted) = &updates[0];

    // The rendered record is created, the stale owned group is pruned, and
    // the SOA serial moves 7 -> 8 in the same change set.
    assert_eq!(wanted.records()[0].name, "web.example.com.");
    assert_eq!(wanted.records()[0].flags.get("setID"), Some("dubber-web"));
    assert_eq!(
        wanted
            .iter()
            .find(|r| r.rrtype == RecordType::SOA)
            .expect("new SOA present")
            .soa_serial()
            .expect("serial parses"),
        8
    );

    assert_eq!(unwanted.records()[0].name, "stale.example.com.");
    assert_eq!(
        unwanted
            .iter()
            .find(|r| r.rrtype == RecordType::SOA)
            .expect("old SOA present")
            .soa_serial()
            .expect("serial parses"),
        7
    );

    assert_eq!(
        metrics
            .discovered_serial
            .with_label_values(&["example.com."])
            .get(),
        7
    );
    assert_eq!(
        metrics
            .provisioned_serial
            .with_label_values(&["example.com."])
            .get(),
        8
    );
}
