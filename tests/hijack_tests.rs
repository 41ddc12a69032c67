use ipnetwork::IpNetwork;
use std::str::FromStr;

use rovimpact::announcement::{Announcement, IngestStats};
use rovimpact::hijack::{
    ingest_hijack_events, is_hijack_relation, HijackEvent, HijackEventRecord, Provenance, RelationDetector,
};
use rovimpact::shared::{CommonASNs, PrefixOrigin, ASN};

fn prefix(s: &str) -> IpNetwork {
    IpNetwork::from_str(s).unwrap()
}

fn ann(p: &str, origin: ASN, time: i64) -> Announcement {
    Announcement::new(prefix(p), origin, time)
}

fn po(p: &str, origin: ASN) -> PrefixOrigin {
    PrefixOrigin::new(prefix(p), origin)
}

#[test]
fn test_scenario_c_cutoff_window() {
    let victim = ann("8.8.8.0/24", 15169, 1000);
    let attacker = ann("8.8.8.0/25", 666, 1005);

    assert!(is_hijack_relation(&attacker, &victim, Some(1002)));
    assert!(!is_hijack_relation(&attacker, &victim, Some(1010)));
}

#[test]
fn test_cutoff_boundaries() {
    let victim = ann("8.8.8.0/24", 15169, 1000);
    let attacker = ann("8.8.8.0/24", 666, 1005);

    // attacker exactly at the cutoff counts
    assert!(is_hijack_relation(&attacker, &victim, Some(1005)));
    // victim exactly at the cutoff does not
    assert!(!is_hijack_relation(&attacker, &victim, Some(1000)));
    // no cutoff, no relation
    assert!(!is_hijack_relation(&attacker, &victim, None));
}

#[test]
fn test_relation_requires_containment_and_distinct_origin() {
    let victim = ann("8.8.8.0/24", 15169, 1000);

    let same_origin = ann("8.8.8.0/25", 15169, 1005);
    assert!(!is_hijack_relation(&same_origin, &victim, Some(1002)));

    let less_specific = ann("8.8.0.0/16", 666, 1005);
    assert!(!is_hijack_relation(&less_specific, &victim, Some(1002)));

    let unrelated = ann("9.9.9.0/24", 666, 1005);
    assert!(!is_hijack_relation(&unrelated, &victim, Some(1002)));
}

fn corpus() -> Vec<Announcement> {
    vec![
        ann("8.8.8.0/24", 15169, 1000),
        ann("8.8.8.0/24", 15169, 2000),
        ann("8.8.8.0/25", 666, 1005),
        ann("8.8.8.0/24", 777, 900),
        ann("8.8.0.0/16", 3356, 500),
        ann("1.1.1.0/24", 13335, 100),
    ]
}

#[test]
fn test_overlaps_without_cutoff() {
    let announcements = corpus();
    let detector = RelationDetector::build(&announcements);
    let table = detector.detect_overlaps(&detector.pairs(), None);

    let google = po("8.8.8.0/24", 15169);
    assert!(table.contains(&google, &po("8.8.8.0/25", 666)));
    assert!(table.contains(&google, &po("8.8.8.0/24", 777)));

    // the /16 holder sees every more specific with another origin
    let level3 = po("8.8.0.0/16", 3356);
    assert_eq!(table.attackers_of(&level3).map(|a| a.len()), Some(3));

    // less specific never counts as an attacker
    assert!(!table.contains(&google, &level3));
    assert!(table.attackers_of(&po("1.1.1.0/24", 13335)).is_none());
    assert_eq!(table.provenance(&google, &po("8.8.8.0/25", 666)), Some(Provenance::Overlap));
}

#[test]
fn test_overlaps_with_cutoff_use_time_spans() {
    let announcements = corpus();
    let detector = RelationDetector::build(&announcements);
    let google = po("8.8.8.0/24", 15169);

    let table = detector.detect_overlaps(&[google], Some(1002));
    // 666 seen at 1005 >= cutoff, google first seen 1000 < cutoff
    assert!(table.contains(&google, &po("8.8.8.0/25", 666)));
    // 777 only seen at 900, before the cutoff
    assert!(!table.contains(&google, &po("8.8.8.0/24", 777)));

    let table = detector.detect_overlaps(&[google], Some(1010));
    assert!(table.is_empty());
}

#[test]
fn test_curated_events() {
    let announcements = corpus();
    let detector = RelationDetector::build(&announcements);
    let google = po("8.8.8.0/24", 15169);

    let events = vec![
        // victim time from the corpus (1000 < 1005)
        HijackEvent::competing(po("8.8.8.0/25", CommonASNs::ATTACKER), 1005, google),
        // victimless
        HijackEvent::non_competing(po("203.0.113.0/24", CommonASNs::ATTACKER), 1200),
        // victim never announced, no time in catalog
        HijackEvent::competing(po("5.5.5.0/25", CommonASNs::ATTACKER), 1005, po("5.5.5.0/24", CommonASNs::VICTIM)),
        // victim never announced but catalog knows when
        HijackEvent::competing(po("6.6.6.0/25", CommonASNs::ATTACKER), 1005, po("6.6.6.0/24", CommonASNs::VICTIM))
            .with_victim_time(10),
        // attacker less specific than victim
        HijackEvent::competing(po("8.0.0.0/8", CommonASNs::ATTACKER), 1005, google),
    ];

    let (table, resolution) = detector.resolve_events(&events, None);
    assert_eq!(resolution.competing, 2);
    assert_eq!(resolution.non_competing, 1);
    assert_eq!(resolution.victim_unseen, 1);
    assert_eq!(resolution.rejected, 1);

    assert_eq!(
        table.provenance(&google, &po("8.8.8.0/25", CommonASNs::ATTACKER)),
        Some(Provenance::Curated)
    );
    assert!(table.is_non_competing(&po("203.0.113.0/24", CommonASNs::ATTACKER)));
    assert_eq!(table.len(), 3);

    // run cutoff after the attack start excludes the event
    let (table, resolution) = detector.resolve_events(&events[..1], Some(1010));
    assert!(table.is_empty());
    assert_eq!(resolution.rejected, 1);
}

#[test]
fn test_non_competing_events_respect_cutoff() {
    let announcements = corpus();
    let detector = RelationDetector::build(&announcements);
    let early = po("203.0.113.0/24", CommonASNs::ATTACKER);
    let on_time = po("198.51.100.0/24", CommonASNs::ATTACKER);

    let events = vec![
        HijackEvent::non_competing(early, 500),
        HijackEvent::non_competing(on_time, 1002),
    ];
    let (table, resolution) = detector.resolve_events(&events, Some(1002));

    assert!(!table.is_non_competing(&early));
    assert!(table.is_non_competing(&on_time));
    assert_eq!(resolution.non_competing, 1);
    assert_eq!(resolution.rejected, 1);

    // without a run cutoff every victimless event is kept
    let (table, _) = detector.resolve_events(&events, None);
    assert_eq!(table.non_competing_count(), 2);
}

#[test]
fn test_event_with_host_bits_matches_corpus() {
    let announcements = corpus();
    let detector = RelationDetector::build(&announcements);
    let event = HijackEvent::competing(po("8.8.8.1/25", 666), 1005, po("8.8.8.1/24", 15169));

    let (table, resolution) = detector.resolve_events(&[event], None);
    assert_eq!(resolution.competing, 1);
    assert_eq!(resolution.victim_unseen, 0);
    assert!(table.contains(&po("8.8.8.0/24", 15169), &po("8.8.8.0/25", 666)));
}

#[test]
fn test_merge_keeps_curated() {
    let announcements = corpus();
    let detector = RelationDetector::build(&announcements);
    let google = po("8.8.8.0/24", 15169);
    let attacker = po("8.8.8.0/25", 666);

    let mut overlaps = detector.detect_overlaps(&[google], None);
    let (curated, _) = detector.resolve_events(&[HijackEvent::competing(attacker, 1005, google)], None);
    overlaps.merge(curated);

    assert_eq!(overlaps.provenance(&google, &attacker), Some(Provenance::Curated));
    assert_eq!(overlaps.provenance(&google, &po("8.8.8.0/24", 777)), Some(Provenance::Overlap));
}

#[test]
fn test_ingest_events_skips_malformed() {
    let records = vec![
        HijackEventRecord {
            attacker_prefix: "8.8.8.0/25".into(),
            attacker_asn: 666,
            victim_prefix: Some("8.8.8.0/24".into()),
            victim_asn: Some(15169),
            time: 1005,
            victim_time: None,
        },
        HijackEventRecord {
            attacker_prefix: "203.0.113.0/24".into(),
            attacker_asn: 666,
            victim_prefix: None,
            victim_asn: None,
            time: 1005,
            victim_time: None,
        },
        HijackEventRecord {
            attacker_prefix: "203.0.113.0/33".into(),
            attacker_asn: 666,
            victim_prefix: None,
            victim_asn: None,
            time: 1005,
            victim_time: None,
        },
        HijackEventRecord {
            attacker_prefix: "203.0.113.0/24".into(),
            attacker_asn: 1 << 40,
            victim_prefix: None,
            victim_asn: None,
            time: 1005,
            victim_time: None,
        },
    ];

    let mut stats = IngestStats::new();
    let events = ingest_hijack_events(records, &mut stats).unwrap();
    assert_eq!(events.len(), 2);
    assert!(events[1].is_non_competing());
    assert_eq!(stats.hijack_events.skipped, 2);
    assert_eq!(stats.total_skipped(), 2);
}
