//! Contact email extraction from raw website HTML.
//!
//! Matches every address-shaped token, drops junk (asset names, placeholders,
//! bounce mailboxes, site-builder domains) and ranks the rest: addresses on
//! the site's own domain first, other custom domains next, free webmail last.
//! Within a tier, role mailboxes such as `info@` beat personal ones.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;
use url::Url;

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)[a-z0-9._%+\-]+@[a-z0-9.\-]+\.[a-z]{2,}").expect("valid regex")
});

static JUNK_EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"(?i)\.(png|jpg|jpeg|gif|svg|webp|css|js|woff|ttf|ico)$",
        r"|sentry\.|example\.|domain\.|schema\.|yoursite\.|youremail\.",
        r"|yourname\.|test\.|demo\.|sample\.|placeholder\.",
        r"|noreply|no-reply|donotreply|do-not-reply|unsubscribe",
        r"|mailer-daemon|postmaster|abuse@|spam@|bounce@",
        r"|wixpress\.com|squarespace\.com|wordpress\.com",
        r"|john\.doe|jane\.doe",
    ))
    .expect("valid regex")
});

const JUNK_LOCALPARTS: &[&str] = &[
    "youremail",
    "yourname",
    "example",
    "test",
    "demo",
    "sample",
    "name",
    "email",
    "user",
    "noreply",
    "no-reply",
    "donotreply",
];

const FREE_PROVIDERS: &[&str] = &[
    "gmail.com",
    "hotmail.com",
    "outlook.com",
    "yahoo.com",
    "yahoo.ca",
    "live.com",
    "icloud.com",
    "me.com",
    "aol.com",
];

/// Role mailboxes in order of preference.
const PREFERRED_LOCALPARTS: &[&str] = &[
    "info",
    "hello",
    "contact",
    "office",
    "admin",
    "reception",
    "book",
    "booking",
    "appointments",
    "enquiries",
    "owner",
    "manager",
];

/// Whether `email` is hosted by a free webmail provider.
pub fn is_free_provider(email: &str) -> bool {
    email
        .rsplit_once('@')
        .is_some_and(|(_, domain)| FREE_PROVIDERS.contains(&domain.to_ascii_lowercase().as_str()))
}

/// Extract usable contact emails from `html`, best first.
///
/// `site_url` is the business website; addresses on its domain rank first.
pub fn extract_emails(html: &str, site_url: Option<&str>) -> Vec<String> {
    let site_host = site_url
        .and_then(|u| Url::parse(u).ok())
        .and_then(|u| u.host_str().map(|h| h.trim_start_matches("www.").to_ascii_lowercase()));

    let candidates: BTreeSet<String> = EMAIL_RE
        .find_iter(html)
        .map(|m| m.as_str().to_ascii_lowercase())
        .filter(|e| !is_junk(e))
        .collect();

    let mut ranked: Vec<((u8, usize), String)> = candidates
        .into_iter()
        .map(|email| {
            let tier = if site_host
                .as_deref()
                .is_some_and(|host| matches_site(&email, host))
            {
                0
            } else if is_free_provider(&email) {
                2
            } else {
                1
            };
            ((tier, localpart_rank(&email)), email)
        })
        .collect();

    // BTreeSet order breaks ties alphabetically.
    ranked.sort_by_key(|(key, _)| *key);
    ranked.into_iter().map(|(_, email)| email).collect()
}

fn is_junk(email: &str) -> bool {
    if JUNK_EMAIL_RE.is_match(email) {
        return true;
    }
    match email.split_once('@') {
        Some((local, _)) => JUNK_LOCALPARTS.contains(&local),
        None => true,
    }
}

fn matches_site(email: &str, site_host: &str) -> bool {
    let Some((_, domain)) = email.rsplit_once('@') else {
        return false;
    };
    domain == site_host
        || site_host.ends_with(&format!(".{domain}"))
        || domain.ends_with(&format!(".{site_host}"))
}

fn localpart_rank(email: &str) -> usize {
    let local = email.split('@').next().unwrap_or_default();
    PREFERRED_LOCALPARTS
        .iter()
        .position(|p| local.starts_with(p))
        .unwrap_or(PREFERRED_LOCALPARTS.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn site_domain_beats_free_provider() {
        let html = r#"
            <p>Email us: owner.bakery@gmail.com</p>
            <a href="mailto:Hello@SweetCrumbs.ca">Say hi</a>
        "#;
        let emails = extract_emails(html, Some("https://www.sweetcrumbs.ca/"));
        assert_eq!(emails, vec!["hello@sweetcrumbs.ca", "owner.bakery@gmail.com"]);
    }

    #[test]
    fn drops_junk_addresses() {
        let html = r#"
            logo@2x.png
            noreply@shop.ca
            you@example.com
            abc123@sentry.wixpress.com
            test@realbiz.ca
            john.doe@realbiz.ca
            bookings@realbiz.ca
        "#;
        let emails = extract_emails(html, Some("https://realbiz.ca"));
        assert_eq!(emails, vec!["bookings@realbiz.ca"]);
    }

    #[test]
    fn ranks_role_mailboxes_within_tier() {
        let html = "sam@dentalco.ca manager@dentalco.ca info@dentalco.ca contact@dentalco.ca";
        let emails = extract_emails(html, Some("https://dentalco.ca"));
        assert_eq!(
            emails,
            vec![
                "info@dentalco.ca",
                "contact@dentalco.ca",
                "manager@dentalco.ca",
                "sam@dentalco.ca"
            ]
        );
    }

    #[test]
    fn subdomain_counts_as_site() {
        let html = "partners@other.ca info@shop.bistro.ca";
        let emails = extract_emails(html, Some("https://bistro.ca"));
        assert_eq!(emails[0], "info@shop.bistro.ca");
    }

    #[test]
    fn no_site_url_still_prefers_custom_domains() {
        let html = "cafe@hotmail.com hi@brewhouse.ca";
        let emails = extract_emails(html, None);
        assert_eq!(emails, vec!["hi@brewhouse.ca", "cafe@hotmail.com"]);
    }

    #[test]
    fn free_provider_detection() {
        assert!(is_free_provider("someone@Gmail.com"));
        assert!(!is_free_provider("info@acme.ca"));
        assert!(!is_free_provider("broken"));
    }
}
