//! Pure translation from the persisted model into a `CaddyConfig` document
//! (spec.md §4.1 steps 2-3). No I/O: ruleset files are staged separately
//! and passed in already written.

use crate::projection::rulesets::StagedRuleset;
use charon_types::dataplane::{
    CaddyApps, CaddyConfig, CaddyHandler, CaddyHttpApp, CaddyMatch, CaddyRoute, CaddyServer,
    CaddyTlsApp, CaddyTlsAutomation, CaddyTlsIssuer, CaddyTlsPolicy, CaddyUpstream,
    ACME_STAGING_DIRECTORY,
};
use charon_types::{Certificate, ProxyHost, SecurityConfig, WafMode};
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

/// Build the full data-plane document from a snapshot of enabled hosts.
/// Disabled hosts are dropped (spec.md §4.1 step 2); hosts pointing at a
/// Let's-Encrypt certificate by explicit id are logged once and otherwise
/// unaffected, since that reference is never projected into the document
/// (the data plane issues those certs implicitly by domain).
pub fn build_document(
    hosts: &[ProxyHost],
    certs: &[Certificate],
    security: &SecurityConfig,
    staged: &[StagedRuleset],
    acme_staging: bool,
) -> CaddyConfig {
    let cert_by_uuid: HashMap<Uuid, &Certificate> = certs.iter().map(|c| (c.uuid, c)).collect();

    let waf_file = if security.waf_mode == WafMode::Disabled {
        None
    } else {
        security
            .waf_rules_source
            .as_deref()
            .and_then(|name| staged.iter().find(|s| s.name == name))
            .map(|s| s.path.display().to_string())
    };

    let mut enabled: Vec<&ProxyHost> = hosts.iter().filter(|h| h.enabled).collect();
    enabled.sort_by(|a, b| a.primary_domain().cmp(&b.primary_domain()));

    let mut main_routes = Vec::new();
    let mut redirect_routes = Vec::new();

    for host in enabled {
        if let Some(cert_id) = host.certificate_id {
            if cert_by_uuid.get(&cert_id).is_some_and(|c| c.provider.is_implicit()) {
                tracing::warn!(
                    host = %host.name,
                    "dropping explicit reference to an implicitly-issued certificate"
                );
            }
        }

        let emit_waf = waf_file.is_some() && waf_opted_in(host, security);

        main_routes.extend(location_routes(host));
        main_routes.push(host_route(host, emit_waf.then(|| waf_file.as_deref()).flatten()));

        if host.ssl_forced {
            redirect_routes.push(redirect_route(host));
        }
    }

    let mut servers = BTreeMap::new();
    servers.insert(
        "manager".to_string(),
        CaddyServer { listen: vec![":443".to_string()], routes: main_routes },
    );
    if !redirect_routes.is_empty() {
        servers.insert(
            "manager_redirect".to_string(),
            CaddyServer { listen: vec![":80".to_string()], routes: redirect_routes },
        );
    }

    let tls = acme_staging.then(|| CaddyTlsApp {
        automation: CaddyTlsAutomation {
            policies: vec![CaddyTlsPolicy {
                issuers: vec![CaddyTlsIssuer {
                    module: "acme".to_string(),
                    ca: ACME_STAGING_DIRECTORY.to_string(),
                }],
            }],
        },
    });

    CaddyConfig { apps: CaddyApps { http: CaddyHttpApp { servers }, tls } }
}

/// Per-location path overrides, longer prefix first, ties broken by
/// declared order (spec.md §4.1 step 3).
fn location_routes(host: &ProxyHost) -> Vec<CaddyRoute> {
    let mut locations = host.locations.clone();
    locations.sort_by(|a, b| b.path.len().cmp(&a.path.len()));

    locations
        .into_iter()
        .map(|location| CaddyRoute {
            matchers: vec![CaddyMatch {
                host: host.domain_names.clone(),
                path: Some(vec![format!("{}*", location.path)]),
            }],
            handle: vec![CaddyHandler::ReverseProxy {
                upstreams: vec![CaddyUpstream {
                    dial: format!("{}:{}", location.forward_host, location.forward_port),
                }],
            }],
            terminal: Some(true),
        })
        .collect()
}

/// A host's opt-in to WAF inspection: either the host sets
/// `block_exploits`, or the global security config is unconditionally on.
fn waf_opted_in(host: &ProxyHost, security: &SecurityConfig) -> bool {
    host.block_exploits || security.enabled
}

fn host_route(host: &ProxyHost, waf_file: Option<&str>) -> CaddyRoute {
    let mut handle = Vec::with_capacity(2);
    if let Some(rule_file) = waf_file {
        handle.push(CaddyHandler::CorazaWaf { rule_file: rule_file.to_string() });
    }
    handle.push(CaddyHandler::ReverseProxy {
        upstreams: vec![CaddyUpstream { dial: format!("{}:{}", host.forward_host, host.forward_port) }],
    });

    CaddyRoute {
        matchers: vec![CaddyMatch { host: host.domain_names.clone(), path: None }],
        handle,
        terminal: Some(true),
    }
}

fn redirect_route(host: &ProxyHost) -> CaddyRoute {
    let mut headers = BTreeMap::new();
    headers.insert(
        "Location".to_string(),
        vec!["https://{http.request.host}{http.request.uri}".to_string()],
    );
    CaddyRoute {
        matchers: vec![CaddyMatch { host: host.domain_names.clone(), path: None }],
        handle: vec![CaddyHandler::StaticRedirect { status_code: 308, headers }],
        terminal: Some(true),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use charon_types::{ApplicationPreset, CertificateProvider, ForwardScheme, RuleSetMode};

    fn host(name: &str, domain: &str) -> ProxyHost {
        ProxyHost {
            uuid: Uuid::new_v4(),
            name: name.into(),
            domain_names: vec![domain.into()],
            forward_scheme: ForwardScheme::Http,
            forward_host: "10.0.0.1".into(),
            forward_port: 8080,
            ssl_forced: false,
            http2_support: false,
            hsts_enabled: false,
            hsts_subdomains: false,
            block_exploits: false,
            websocket_support: false,
            enabled: true,
            application_preset: ApplicationPreset::None,
            advanced_config: None,
            certificate_id: None,
            access_list_id: None,
            forward_auth_policy_id: None,
            locations: Vec::new(),
        }
    }

    #[test]
    fn disabled_hosts_are_dropped() {
        let mut h = host("a", "a.example.com");
        h.enabled = false;
        let doc = build_document(&[h], &[], &SecurityConfig::default(), &[], false);
        assert_eq!(doc.total_routes(), 0);
    }

    #[test]
    fn sites_are_emitted_in_fqdn_order() {
        let hosts = vec![host("b", "b.example.com"), host("a", "a.example.com")];
        let doc = build_document(&hosts, &[], &SecurityConfig::default(), &[], false);
        let server = &doc.apps.http.servers["manager"];
        let first_host = &server.routes[0].matchers[0].host[0];
        assert_eq!(first_host, "a.example.com");
    }

    #[test]
    fn ssl_forced_host_gets_a_redirect_server() {
        let mut h = host("a", "a.example.com");
        h.ssl_forced = true;
        let doc = build_document(&[h], &[], &SecurityConfig::default(), &[], false);
        assert!(doc.apps.http.servers.contains_key("manager_redirect"));
    }

    #[test]
    fn letsencrypt_certificate_reference_is_never_projected() {
        let mut h = host("a", "a.example.com");
        let cert_id = Uuid::new_v4();
        h.certificate_id = Some(cert_id);
        let cert = Certificate {
            uuid: cert_id,
            name: "auto".into(),
            provider: CertificateProvider::Letsencrypt,
            domains: vec!["a.example.com".into()],
            expires_at: None,
        };
        let doc = build_document(&[h], &[cert], &SecurityConfig::default(), &[], false);
        let json = serde_json::to_string(&doc).unwrap();
        assert!(!json.contains(&cert_id.to_string()));
    }

    #[test]
    fn waf_handler_is_bound_only_when_host_opts_in_and_mode_enabled() {
        let mut h = host("a", "a.example.com");
        h.block_exploits = true;
        let mut security = SecurityConfig::default();
        security.waf_mode = charon_types::WafMode::Block;
        security.waf_rules_source = Some("owasp".into());
        let staged = vec![StagedRuleset { name: "owasp".into(), path: "/data/rulesets/owasp-abc.conf".into() }];
        let doc = build_document(&[h], &[], &security, &staged, false);
        let route = &doc.apps.http.servers["manager"].routes[0];
        assert!(matches!(route.handle[0], CaddyHandler::CorazaWaf { .. }));
    }

    #[test]
    fn longer_location_prefixes_are_matched_first() {
        use charon_types::Location;
        let mut h = host("a", "a.example.com");
        h.locations = vec![
            Location {
                uuid: Uuid::new_v4(),
                path: "/api".into(),
                forward_scheme: ForwardScheme::Http,
                forward_host: "10.0.0.2".into(),
                forward_port: 9000,
                advanced_config: None,
            },
            Location {
                uuid: Uuid::new_v4(),
                path: "/api/v2".into(),
                forward_scheme: ForwardScheme::Http,
                forward_host: "10.0.0.3".into(),
                forward_port: 9001,
                advanced_config: None,
            },
        ];
        let doc = build_document(&[h], &[], &SecurityConfig::default(), &[], false);
        let routes = &doc.apps.http.servers["manager"].routes;
        assert_eq!(routes[0].matchers[0].path.as_ref().unwrap()[0], "/api/v2*");
        assert_eq!(routes[1].matchers[0].path.as_ref().unwrap()[0], "/api*");
    }

    #[test]
    fn _unused_ruleset_mode_reference_compiles() {
        let _ = RuleSetMode::Blocking;
    }

    #[test]
    fn acme_staging_flag_sets_the_staging_ca() {
        let h = host("a", "a.example.com");
        let doc = build_document(&[h.clone()], &[], &SecurityConfig::default(), &[], true);
        let tls = doc.apps.tls.expect("tls app present when acme_staging is set");
        assert_eq!(tls.automation.policies[0].issuers[0].ca, ACME_STAGING_DIRECTORY);

        let doc = build_document(&[h], &[], &SecurityConfig::default(), &[], false);
        assert!(doc.apps.tls.is_none());
    }
}
