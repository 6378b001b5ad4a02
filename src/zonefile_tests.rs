// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for the master-file parser.

#[cfg(test)]
mod tests {
    use hickory_proto::rr::{DNSClass, RecordType};

    use crate::zonefile::parse_zone_data;

    #[test]
    fn test_parse_basic_records() {
        let zone = parse_zone_data(
            "www.example.com. 10 IN A 8.8.8.8
www.example.com. 10 AAAA 2001:4860:4860::8888
",
        )
        .expect("zone parses");

        assert_eq!(zone.len(), 2);
        let records = zone.records();
        assert_eq!(records[0].name, "www.example.com.");
        assert_eq!(records[0].ttl, 10);
        assert_eq!(records[0].class, DNSClass::IN);
        assert_eq!(records[0].rrtype, RecordType::A);
        assert_eq!(records[0].rdata, "8.8.8.8");
        // Class defaults to IN when omitted.
        assert_eq!(records[1].class, DNSClass::IN);
        assert_eq!(records[1].rrtype, RecordType::AAAA);
    }

    #[test]
    fn test_parse_class_and_ttl_in_either_order() {
        let zone = parse_zone_data("www.example.com. IN 10 A 8.8.8.8\n").expect("zone parses");
        let rec = &zone.records()[0];
        assert_eq!(rec.ttl, 10);
        assert_eq!(rec.class, DNSClass::IN);
    }

    #[test]
    fn test_parse_flags_from_comment() {
        let zone = parse_zone_data(
            "www.example.com. 10 IN A 8.8.8.8 ; comment=1 route53.SetID=blue bare
",
        )
        .expect("zone parses");
        let flags = &zone.records()[0].flags;
        assert_eq!(flags.get("comment"), Some("1"));
        assert_eq!(flags.get("route53.SetID"), Some("blue"));
        assert_eq!(flags.get("bare"), Some(""));
    }

    #[test]
    fn test_parse_skips_blank_and_comment_lines() {
        let zone = parse_zone_data(
            "
; a whole-line comment
www.example.com. 10 IN A 8.8.8.8

",
        )
        .expect("zone parses");
        assert_eq!(zone.len(), 1);
    }

    #[test]
    fn test_parse_ttl_directive() {
        let zone = parse_zone_data(
            "$TTL 86400
www.example.com. IN A 8.8.8.8
www.example.com. 10 IN A 9.9.9.9
",
        )
        .expect("zone parses");
        assert_eq!(zone.records()[0].ttl, 86400);
        // An explicit TTL still wins over the default.
        assert_eq!(zone.records()[1].ttl, 10);
    }

    #[test]
    fn test_parse_no_ttl_is_an_error() {
        let err = parse_zone_data("www.example.com. IN A 8.8.8.8\n").expect_err("missing ttl");
        assert_eq!(err.issues().len(), 1);
        assert!(err.to_string().contains("no TTL"), "got: {err}");
    }

    #[test]
    fn test_parse_origin_directive() {
        let zone = parse_zone_data(
            "$ORIGIN example.com.
$TTL 300
www IN A 8.8.8.8
@ IN A 9.9.9.9
",
        )
        .expect("zone parses");
        assert_eq!(zone.records()[0].name, "www.example.com.");
        assert_eq!(zone.records()[1].name, "example.com.");
    }

    #[test]
    fn test_parse_relative_name_without_origin_is_an_error() {
        let err = parse_zone_data("www 10 IN A 8.8.8.8\n").expect_err("relative name");
        assert!(err.to_string().contains("without $ORIGIN"), "got: {err}");
    }

    #[test]
    fn test_parse_owner_inheritance() {
        let zone = parse_zone_data(
            "www.example.com. 10 IN A 8.8.8.8
    10 IN A 9.9.9.9
",
        )
        .expect("zone parses");
        assert_eq!(zone.len(), 2);
        assert_eq!(zone.records()[1].name, "www.example.com.");
        assert_eq!(zone.records()[1].rdata, "9.9.9.9");
    }

    #[test]
    fn test_parse_multiline_soa() {
        let zone = parse_zone_data(
            "$TTL 86400
@   IN  SOA example.com. root.example.com. (
\t\t100   ;Serial
\t\t3600  ;Refresh
\t\t1800  ;Retry
\t  6048      ;Expire
    8640      ;Minimum TTL
)

thing.example.com.\t10\tIN\tA\t6.6.6.6
",
        )
        .expect("zone parses");

        assert_eq!(zone.len(), 2);
        let soa = &zone.records()[0];
        assert_eq!(soa.rrtype, RecordType::SOA);
        assert_eq!(soa.ttl, 86400);
        assert_eq!(
            soa.rdata,
            "example.com. root.example.com. 100 3600 1800 6048 8640"
        );
        assert_eq!(soa.soa_serial().expect("serial parses"), 100);
        // Field annotations inside the parens never become flags.
        assert!(soa.flags.is_empty());
    }

    #[test]
    fn test_parse_single_line_soa_with_parens() {
        let zone = parse_zone_data(
            "example.com. 86400 IN SOA ns1.example.com. root.example.com. ( 2024010101 3600 600 604800 86400 )\n",
        )
        .expect("zone parses");
        assert_eq!(zone.records()[0].soa_serial().expect("serial parses"), 2024010101);
    }

    #[test]
    fn test_parse_collects_every_bad_line() {
        let err = parse_zone_data(
            "www.example.com. 10 IN A 8.8.8.8
www.example.com. 10 IN BOGUS 8.8.8.8
ok.example.com. 10 IN A 9.9.9.9
www.example.com. 10 IN A
",
        )
        .expect_err("bad zone");

        assert_eq!(err.issues().len(), 2);
        assert_eq!(err.issues()[0].line, 2);
        assert_eq!(err.issues()[1].line, 4);

        let message = err.to_string();
        assert!(
            message.starts_with("2 errors while processing zone:"),
            "got: {message}"
        );
        assert!(message.contains("unknown record type"), "got: {message}");
        assert!(message.contains("missing rdata"), "got: {message}");
    }

    #[test]
    fn test_parse_unclosed_paren() {
        let err = parse_zone_data(
            "@ IN SOA example.com. root.example.com. (
\t\t100
",
        )
        .expect_err("unclosed paren");
        assert!(err.to_string().contains("unclosed parenthesis"), "got: {err}");
    }

    #[test]
    fn test_parse_semicolon_inside_quotes() {
        let zone = parse_zone_data(
            "www.example.com. 10 IN TXT \"v=spf1; include:example.net\" ; comment=1\n",
        )
        .expect("zone parses");
        let rec = &zone.records()[0];
        assert_eq!(rec.rdata, "\"v=spf1; include:example.net\"");
        assert_eq!(rec.flags.get("comment"), Some("1"));
    }

    #[test]
    fn test_parse_unsupported_directive() {
        let err = parse_zone_data("$GENERATE 1-10 www-$ A 1.1.1.1\n").expect_err("directive");
        assert!(err.to_string().contains("unsupported directive"), "got: {err}");
    }
}
