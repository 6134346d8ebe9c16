use crate::envelope::{Body, Envelope, Payload};
use ryvie_core::{Config, DiskScanner, PlanStage, ProposalEngine, StorageError, TopologySource};

/// Commands reserved for later provisioning work that are not plan stages.
const RESERVED: [&str; 4] = ["preflight", "status", "create", "subvolumes"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Scan,
    Proposal,
    Stage(PlanStage),
    Reserved(&'static str),
}

impl Command {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "scan" => Some(Command::Scan),
            "proposal" => Some(Command::Proposal),
            _ => PlanStage::from_name(name).map(Command::Stage).or_else(|| {
                RESERVED
                    .iter()
                    .copied()
                    .find(|reserved| *reserved == name)
                    .map(Command::Reserved)
            }),
        }
    }

    /// Every accepted command name, in the order shown to users.
    pub fn names() -> Vec<&'static str> {
        let mut names = vec!["scan", "proposal", RESERVED[0], RESERVED[1], RESERVED[2]];
        names.extend(PlanStage::ALL.iter().map(PlanStage::as_str));
        names.push(RESERVED[3]);
        names
    }
}

/// Run one command and build its envelope. Failures never escape as `Err`;
/// they are reported inside the envelope.
pub async fn run(name: &str, payload: &str, source: &dyn TopologySource, config: &Config) -> Envelope {
    let payload = match Payload::parse(payload) {
        Ok(payload) => payload,
        Err(err) => {
            log::debug!("rejected payload for {}: {}", name, err);
            return Envelope::parse_error(name, &err);
        }
    };

    let Some(command) = Command::parse(name) else {
        log::debug!("unknown command {:?}", name);
        return Envelope::unknown_command(name, payload, &Command::names());
    };

    match command {
        Command::Scan => {
            let scanner = DiskScanner::new(source, config.topology.device_prefix.as_str());
            match scanner.scan().await {
                Ok(disks) => Envelope::success(name, payload, Body::Scan { disks }),
                Err(err) => {
                    log::warn!("scan failed: {}", err);
                    Envelope::failure(name, payload, &err)
                }
            }
        }
        Command::Proposal => {
            let engine = ProposalEngine::new(source, config);
            match engine.propose(&payload.fields).await {
                Ok(proposal) => {
                    log::debug!(
                        "proposed {} for {} disks",
                        proposal.suggested,
                        proposal.selected_disks.len()
                    );
                    Envelope::success(name, payload, Body::Proposal(proposal))
                }
                Err(err) => Envelope::failure(name, payload, &err),
            }
        }
        Command::Stage(_) | Command::Reserved(_) => Envelope::not_implemented(name, payload),
    }
}

/// The command line around `name` did not parse. The failure is reported in
/// that command's envelope.
pub fn reject(name: &str, message: &str) -> Envelope {
    log::debug!("rejected arguments for {}: {}", name, message);
    Envelope::parse_error(name, &StorageError::ArgsParse(message.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ryvie_core::test_utils::{disk, partition, MockTopology};
    use ryvie_core::TopologyReport;
    use serde_json::Value;

    const GB: u64 = 1_000_000_000;

    fn host() -> MockTopology {
        let report = TopologyReport {
            devices: vec![
                disk("sda", 500 * GB).with_children(vec![
                    partition("sda1", 512 * 1024 * 1024, Some("vfat"), Some("/boot/efi")),
                    partition("sda2", 499 * GB, Some("ext4"), Some("/")),
                ]),
                disk("sdb", 1000 * GB),
                disk("sdc", 1005 * GB),
                disk("sdd", 998 * GB),
                disk("nvme0n1", 2000 * GB),
            ],
        };
        MockTopology::new(report, "/dev/sda2")
    }

    async fn invoke(name: &str, payload: &str, source: &MockTopology) -> (String, Value) {
        let envelope = run(name, payload, source, &Config::default()).await;
        let mut buf = Vec::new();
        envelope.emit(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let value = serde_json::from_str(&text).unwrap();
        (text, value)
    }

    #[test]
    fn test_command_names_resolve() {
        assert_eq!(Command::parse("scan"), Some(Command::Scan));
        assert_eq!(Command::parse("mdadm"), Some(Command::Stage(PlanStage::Mdadm)));
        assert_eq!(Command::parse("subvolumes"), Some(Command::Reserved("subvolumes")));
        assert_eq!(Command::parse("Scan"), None);
        assert_eq!(Command::parse(""), None);
        for name in Command::names() {
            assert!(Command::parse(name).is_some(), "{}", name);
        }
        assert_eq!(Command::names().len(), 12);
    }

    #[tokio::test]
    async fn test_scan_lists_disks() {
        let source = host();
        let (_, value) = invoke("scan", "", &source).await;

        assert_eq!(value["ok"], true);
        assert_eq!(value["command"], "scan");
        assert_eq!(value["args"], serde_json::json!({}));
        let disks = value["disks"].as_array().unwrap();
        assert_eq!(disks.len(), 5);

        let sda = &disks[0];
        assert_eq!(sda["id"], "/dev/sda");
        assert_eq!(sda["isSystem"], true);
        assert_eq!(sda["isMounted"], true);
        assert_eq!(sda["mountpoint"], "/boot/efi");
        assert_eq!(sda["partitions"].as_array().unwrap().len(), 2);
        assert_eq!(sda["partitions"][1]["type"], "partition");

        assert_eq!(disks[1]["isSystem"], false);
        assert_eq!(disks[1]["isMounted"], false);
        assert_eq!(disks[1]["mountpoint"], "");
        assert_eq!(disks[1]["health"], "unknown");
    }

    #[tokio::test]
    async fn test_scan_reports_query_failure() {
        let source = host().failing_with(StorageError::query("lsblk", "exit status 1"));
        let (_, value) = invoke("scan", "{}", &source).await;
        assert_eq!(value["ok"], false);
        assert_eq!(value["error"], "lsblk_failed");
        assert_eq!(value["detail"], "lsblk: exit status 1");
        assert!(value.get("disks").is_none());
    }

    #[tokio::test]
    async fn test_proposal_near_equal_disks() {
        let source = host();
        let (_, value) = invoke(
            "proposal",
            r#"{"diskIds":["/dev/sdb","/dev/sdc","/dev/sdd"]}"#,
            &source,
        )
        .await;

        assert_eq!(value["ok"], true);
        assert_eq!(value["suggested"], "raid5");
        assert_eq!(value["capacityBytes"], 2 * 998 * GB);
        assert_eq!(value["faultTolerance"], 1);
        assert_eq!(value["selectedDisks"][2], "/dev/sdd");

        let stages: Vec<&str> = value["planPreview"]
            .as_array()
            .unwrap()
            .iter()
            .map(|step| step["stage"].as_str().unwrap())
            .collect();
        assert_eq!(stages, ["partition", "mdadm", "persist", "lvm", "format", "mount"]);
    }

    #[tokio::test]
    async fn test_proposal_mixed_sizes_exposes_tiers() {
        let source = host();
        let (_, value) = invoke(
            "proposal",
            r#"{"diskIds":["/dev/sda","/dev/sdb","/dev/nvme0n1"]}"#,
            &source,
        )
        .await;

        assert_eq!(value["suggested"], "shr-like");
        assert_eq!(value["capacityBytes"], 1500 * GB);
        let mdadm = &value["planPreview"][1];
        assert_eq!(mdadm["level"], "tiered");
        assert!(!mdadm["tiers"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_proposal_errors() {
        let cases = [
            ("{}", "missing_diskIds"),
            (r#"{"diskIds":"/dev/sdb"}"#, "invalid_diskIds"),
            (r#"{"diskIds":["/dev/sdb"]}"#, "need_at_least_two_disks"),
            (r#"{"diskIds":["/dev/sdb","/dev/sdz"]}"#, "unknown_disks_in_selection"),
        ];
        for (payload, tag) in cases {
            let source = host();
            let (text, value) = invoke("proposal", payload, &source).await;
            assert_eq!(value["ok"], false, "{}", text);
            assert_eq!(value["error"], tag, "{}", text);
            assert!(value.get("suggested").is_none());
        }
    }

    #[tokio::test]
    async fn test_proposal_validates_before_querying() {
        let source = host();
        invoke("proposal", r#"{"diskIds":[]}"#, &source).await;
        assert_eq!(source.call_count(), 0);
    }

    #[tokio::test]
    async fn test_stub_echoes_payload_verbatim() {
        let payload = r#"{"level": "raid5",  "members": ["/dev/sdb"], "x": 1.0}"#;
        for name in Command::names().into_iter().filter(|n| *n != "scan" && *n != "proposal") {
            let source = host();
            let (text, value) = invoke(name, payload, &source).await;
            assert!(text.contains(payload), "{}", text);
            assert_eq!(value["ok"], false);
            assert_eq!(value["command"], name);
            assert_eq!(value["error"], "not_implemented");
            assert!(value["note"].as_str().is_some());
            assert_eq!(source.call_count(), 0);
        }
    }

    #[tokio::test]
    async fn test_proposal_uses_fresh_size_query() {
        let sizes = TopologyReport {
            devices: vec![disk("sda", 500 * GB), disk("sdb", 1000 * GB), disk("sdc", 1005 * GB)],
        };
        let source = host().with_size_report(sizes);

        let (_, scanned) = invoke("scan", "{}", &source).await;
        let ids: Vec<&str> = scanned["disks"]
            .as_array()
            .unwrap()
            .iter()
            .map(|d| d["id"].as_str().unwrap())
            .collect();
        assert!(ids.contains(&"/dev/sdd"));

        let (_, value) = invoke(
            "proposal",
            r#"{"diskIds":["/dev/sdb","/dev/sdc","/dev/sdd"]}"#,
            &source,
        )
        .await;
        assert_eq!(value["ok"], false);
        assert_eq!(value["error"], "unknown_disks_in_selection");
        assert_eq!(value["detail"], "/dev/sdd");
        assert!(value.get("capacityBytes").is_none());
    }

    #[test]
    fn test_rejected_arguments_envelope() {
        let envelope = reject("status", "unexpected argument '--force' found");
        let mut buf = Vec::new();
        envelope.emit(&mut buf).unwrap();
        let value: Value = serde_json::from_slice(&buf).unwrap();
        assert_eq!(value["ok"], false);
        assert_eq!(value["command"], "status");
        assert_eq!(value["error"], "parse_error");
        assert_eq!(value["args"]["parse_error"], "unexpected argument '--force' found");
    }

    #[tokio::test]
    async fn test_unknown_command() {
        let source = host();
        let (_, value) = invoke("destroy", r#"{"force":true}"#, &source).await;
        assert_eq!(value["ok"], false);
        assert_eq!(value["command"], "destroy");
        assert_eq!(value["error"], "unknown_command");
        assert_eq!(value["args"]["force"], true);
        assert!(value["note"].as_str().unwrap().contains("proposal"));
    }

    #[tokio::test]
    async fn test_malformed_payload_wins_over_command() {
        for name in ["scan", "proposal", "lvm", "destroy"] {
            let source = host();
            let (_, value) = invoke(name, "{\"diskIds\": [", &source).await;
            assert_eq!(value["ok"], false);
            assert_eq!(value["command"], name);
            assert_eq!(value["error"], "parse_error");
            assert!(value["args"]["parse_error"].is_string());
            assert_eq!(source.call_count(), 0);
        }
    }
}
