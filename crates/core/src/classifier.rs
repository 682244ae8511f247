//! Static URL/text pattern tables for identity providers and application-tracking systems.
//!
//! Tables are evaluated in declaration order and the first match wins, so the
//! order of [`PROVIDER_DEFS`] and [`ATS_DEFS`] is their priority. Provider URL
//! patterns are not guaranteed to be disjoint.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use tabwright_protocol::Purpose;

/// Declarative provider entry. Patterns are case-insensitive regexes over the full URL.
#[derive(Debug, Clone, Copy)]
pub struct ProviderDef {
	pub name: &'static str,
	pub url_patterns: &'static [&'static str],
	pub success_patterns: &'static [&'static str],
	pub failure_patterns: &'static [&'static str],
	pub timeout_ms: u64,
}

/// Declarative application-tracking-system entry.
#[derive(Debug, Clone, Copy)]
pub struct AtsDef {
	pub name: &'static str,
	pub url_patterns: &'static [&'static str],
}

pub const PROVIDER_DEFS: &[ProviderDef] = &[
	ProviderDef {
		name: "google",
		url_patterns: &[r"^https://accounts\.google\.com/(o/oauth2|signin/oauth|v3/signin|servicelogin|accountchooser)"],
		success_patterns: &[r"[?&#]code=", r"[?&#]approvalcode=", r"accounts\.google\.com/o/oauth2/approval"],
		failure_patterns: &[r"[?&#]error=(access_denied|consent_required|interaction_required)", r"/signin/rejected"],
		timeout_ms: 120_000,
	},
	ProviderDef {
		name: "microsoft",
		url_patterns: &[r"^https://login\.(microsoftonline|live)\.com/"],
		success_patterns: &[r"[?&#]code="],
		failure_patterns: &[r"[?&#]error=access_denied", r"[?&#]error_subcode=cancel"],
		timeout_ms: 120_000,
	},
	ProviderDef {
		name: "linkedin",
		url_patterns: &[r"^https://(www\.)?linkedin\.com/(oauth|uas/login|checkpoint/lg/login)"],
		success_patterns: &[r"[?&#]code="],
		failure_patterns: &[r"[?&#]error=(user_cancelled_login|user_cancelled_authorize|access_denied)"],
		timeout_ms: 180_000,
	},
	ProviderDef {
		name: "github",
		url_patterns: &[r"^https://github\.com/(login/oauth|login|session)"],
		success_patterns: &[r"[?&#]code="],
		failure_patterns: &[r"[?&#]error=access_denied"],
		timeout_ms: 120_000,
	},
	ProviderDef {
		name: "apple",
		url_patterns: &[r"^https://appleid\.apple\.com/auth/(authorize|signin)"],
		success_patterns: &[r"[?&#]code=", r"[?&#]id_token="],
		failure_patterns: &[r"[?&#]error=(user_cancelled_authorize|access_denied)"],
		timeout_ms: 180_000,
	},
	ProviderDef {
		name: "facebook",
		url_patterns: &[r"^https://(www\.|m\.)?facebook\.com/(v[\d.]+/)?dialog/oauth", r"^https://(www\.|m\.)?facebook\.com/login"],
		success_patterns: &[r"[?&#]code=", r"[?&#]access_token="],
		failure_patterns: &[r"[?&#]error=access_denied", r"[?&#]error_reason=user_denied"],
		timeout_ms: 120_000,
	},
	ProviderDef {
		name: "indeed",
		url_patterns: &[r"^https://secure\.indeed\.com/(auth|oauth|account/login)"],
		success_patterns: &[r"[?&#]code="],
		failure_patterns: &[r"[?&#]error=access_denied"],
		timeout_ms: 180_000,
	},
];

pub const ATS_DEFS: &[AtsDef] = &[
	AtsDef {
		name: "workday",
		url_patterns: &[r"\.myworkdayjobs\.com/", r"\.myworkdaysite\.com/", r"^https://wd\d+\.myworkday\.com/"],
	},
	AtsDef {
		name: "greenhouse",
		url_patterns: &[r"^https://(boards|job-boards)\.greenhouse\.io/", r"[?&]gh_jid="],
	},
	AtsDef {
		name: "lever",
		url_patterns: &[r"^https://jobs\.lever\.co/"],
	},
	AtsDef {
		name: "icims",
		url_patterns: &[r"\.icims\.com/jobs"],
	},
	AtsDef {
		name: "taleo",
		url_patterns: &[r"\.taleo\.net/"],
	},
	AtsDef {
		name: "smartrecruiters",
		url_patterns: &[r"^https://(jobs|careers)\.smartrecruiters\.com/"],
	},
	AtsDef {
		name: "ashby",
		url_patterns: &[r"^https://jobs\.ashbyhq\.com/"],
	},
	AtsDef {
		name: "jobvite",
		url_patterns: &[r"^https://jobs\.jobvite\.com/"],
	},
	AtsDef {
		name: "bamboohr",
		url_patterns: &[r"\.bamboohr\.com/(careers|jobs)"],
	},
	AtsDef {
		name: "successfactors",
		url_patterns: &[r"\.successfactors\.(com|eu)/", r"career\d*\.sapsf\.(com|eu)/"],
	},
];

static VERIFICATION_URL: LazyLock<Regex> =
	LazyLock::new(|| compile(r"(verify|verification|confirm[-_]?email|two[-_]?factor|2fa|mfa|captcha|challenge)"));

static VERIFICATION_TEXT: LazyLock<Regex> = LazyLock::new(|| {
	compile(r"(verify your|verification code|confirm your (email|account)|security check|captcha|one-time (code|passcode)|are you a robot)")
});

static BUILTIN_PROVIDERS: LazyLock<ProviderTable> = LazyLock::new(|| ProviderTable::new(PROVIDER_DEFS));

static BUILTIN_ATS: LazyLock<Vec<Ats>> = LazyLock::new(|| ATS_DEFS.iter().map(Ats::compile).collect());

fn compile(pattern: &str) -> Regex {
	Regex::new(&format!("(?i){pattern}")).expect("static classifier pattern must compile")
}

fn compile_all(patterns: &[&str]) -> Vec<Regex> {
	patterns.iter().map(|p| compile(p)).collect()
}

/// Compiled identity provider.
#[derive(Debug)]
pub struct Provider {
	pub name: &'static str,
	pub timeout_ms: u64,
	url: Vec<Regex>,
	success: Vec<Regex>,
	failure: Vec<Regex>,
}

impl Provider {
	fn compile(def: &ProviderDef) -> Self {
		Self {
			name: def.name,
			timeout_ms: def.timeout_ms,
			url: compile_all(def.url_patterns),
			success: compile_all(def.success_patterns),
			failure: compile_all(def.failure_patterns),
		}
	}

	pub fn matches_url(&self, url: &str) -> bool {
		self.url.iter().any(|re| re.is_match(url))
	}
}

/// Compiled application-tracking system.
#[derive(Debug)]
pub struct Ats {
	pub name: &'static str,
	url: Vec<Regex>,
}

impl Ats {
	fn compile(def: &AtsDef) -> Self {
		Self {
			name: def.name,
			url: compile_all(def.url_patterns),
		}
	}

	pub fn matches_url(&self, url: &str) -> bool {
		self.url.iter().any(|re| re.is_match(url))
	}
}

/// Ordered provider table.
#[derive(Debug)]
pub struct ProviderTable {
	providers: Vec<Provider>,
}

impl ProviderTable {
	pub fn new(defs: &[ProviderDef]) -> Self {
		Self {
			providers: defs.iter().map(Provider::compile).collect(),
		}
	}

	/// First provider, in declaration order, whose URL patterns match.
	pub fn classify(&self, url: &str) -> Option<&Provider> {
		self.providers.iter().find(|provider| provider.matches_url(url))
	}

	pub fn by_name(&self, name: &str) -> Option<&Provider> {
		self.providers.iter().find(|provider| provider.name.eq_ignore_ascii_case(name.trim()))
	}

	pub fn iter(&self) -> impl Iterator<Item = &Provider> {
		self.providers.iter()
	}
}

/// Outcome of classifying a URL against completion patterns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Completion {
	Success,
	Failure,
	Pending,
}

/// Everything the classifier can say about a freshly observed context.
#[derive(Debug, Clone, Copy, Default)]
pub struct Classification {
	pub provider: Option<&'static Provider>,
	pub ats: Option<&'static Ats>,
	pub verification: bool,
}

impl Classification {
	/// Purpose after applying this classification to `current`.
	///
	/// A provider always means OAuth. ATS and verification matches only refine an unknown purpose.
	pub fn upgrade(&self, current: Purpose) -> Purpose {
		if self.provider.is_some() {
			return Purpose::Oauth;
		}
		if current != Purpose::Unknown {
			return current;
		}
		if self.ats.is_some() {
			Purpose::ExternalForm
		} else if self.verification {
			Purpose::Verification
		} else {
			current
		}
	}
}

/// The compiled built-in provider table.
pub fn providers() -> &'static ProviderTable {
	&BUILTIN_PROVIDERS
}

/// The compiled built-in ATS table.
pub fn ats_systems() -> &'static [Ats] {
	&BUILTIN_ATS
}

pub fn classify_provider(url: &str) -> Option<&'static Provider> {
	providers().classify(url)
}

pub fn provider_by_name(name: &str) -> Option<&'static Provider> {
	providers().by_name(name)
}

pub fn classify_ats(url: &str) -> Option<&'static Ats> {
	ats_systems().iter().find(|ats| ats.matches_url(url))
}

pub fn looks_like_verification(url: &str, title: &str) -> bool {
	VERIFICATION_URL.is_match(url) || VERIFICATION_TEXT.is_match(title)
}

pub fn classify_context(url: &str, title: &str) -> Classification {
	Classification {
		provider: classify_provider(url),
		ats: classify_ats(url),
		verification: looks_like_verification(url, title),
	}
}

/// Purpose implied by the free-text reason of a PENDING_OPEN request.
pub fn purpose_hint(reason: &str) -> Purpose {
	let reason = reason.to_ascii_lowercase();
	let has = |needles: &[&str]| needles.iter().any(|needle| reason.contains(needle));
	if has(&["oauth", "login", "sign"]) {
		Purpose::Oauth
	} else if has(&["upload", "document", "resume"]) {
		Purpose::DocumentUpload
	} else if has(&["verif"]) {
		Purpose::Verification
	} else if has(&["apply", "application", "external"]) {
		Purpose::ExternalForm
	} else {
		Purpose::Unknown
	}
}

/// Classifies a URL as a success, failure or still-pending step of a provider flow.
///
/// With a provider, its success patterns are tested before its failure patterns.
/// Without one, generic OAuth redirect parameters decide.
pub fn classify_completion(url: &str, provider: Option<&Provider>) -> Completion {
	match provider {
		Some(provider) => {
			if provider.success.iter().any(|re| re.is_match(url)) {
				Completion::Success
			} else if provider.failure.iter().any(|re| re.is_match(url)) {
				Completion::Failure
			} else {
				Completion::Pending
			}
		}
		None => generic_completion(url),
	}
}

fn generic_completion(url: &str) -> Completion {
	let Ok(parsed) = url::Url::parse(url) else {
		return Completion::Pending;
	};

	let mut params: Vec<(String, String)> = parsed.query_pairs().into_owned().collect();
	if let Some(fragment) = parsed.fragment() {
		params.extend(url::form_urlencoded::parse(fragment.as_bytes()).into_owned());
	}

	let has_code = params
		.iter()
		.any(|(key, value)| matches!(key.as_str(), "code" | "access_token" | "oauth_verifier") && !value.is_empty());
	if has_code {
		return Completion::Success;
	}

	let denied = params.iter().any(|(key, value)| key == "error" && value.eq_ignore_ascii_case("access_denied"));
	if denied { Completion::Failure } else { Completion::Pending }
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn pending_open_reasons_hint_purpose() {
		assert_eq!(purpose_hint("Sign in with Google"), Purpose::Oauth);
		assert_eq!(purpose_hint("oauth-popup"), Purpose::Oauth);
		assert_eq!(purpose_hint("Upload resume"), Purpose::DocumentUpload);
		assert_eq!(purpose_hint("email verification"), Purpose::Verification);
		assert_eq!(purpose_hint("external application form"), Purpose::ExternalForm);
		assert_eq!(purpose_hint("popup"), Purpose::Unknown);
	}

	#[test]
	fn builtin_tables_compile() {
		assert_eq!(providers().iter().count(), PROVIDER_DEFS.len());
		assert_eq!(ats_systems().len(), ATS_DEFS.len());
	}

	#[test]
	fn recognizes_provider_login_urls() {
		let cases = [
			("https://accounts.google.com/o/oauth2/v2/auth?client_id=x", "google"),
			("https://login.microsoftonline.com/common/oauth2/v2.0/authorize", "microsoft"),
			("https://www.linkedin.com/oauth/v2/authorization?response_type=code", "linkedin"),
			("https://github.com/login/oauth/authorize?client_id=1", "github"),
			("https://appleid.apple.com/auth/authorize?client_id=a", "apple"),
			("https://www.facebook.com/v18.0/dialog/oauth?client_id=1", "facebook"),
			("https://secure.indeed.com/auth?continue=x", "indeed"),
		];
		for (url, expected) in cases {
			assert_eq!(classify_provider(url).map(|p| p.name), Some(expected), "{url}");
		}
		assert!(classify_provider("https://careers.example.com/apply").is_none());
	}

	#[test]
	fn earlier_declared_provider_wins_on_overlap() {
		let defs = [
			ProviderDef {
				name: "first",
				url_patterns: &[r"^https://sso\.example\.com/"],
				success_patterns: &[],
				failure_patterns: &[],
				timeout_ms: 1,
			},
			ProviderDef {
				name: "second",
				url_patterns: &[r"example\.com"],
				success_patterns: &[],
				failure_patterns: &[],
				timeout_ms: 1,
			},
		];
		let table = ProviderTable::new(&defs);
		assert_eq!(table.classify("https://sso.example.com/login").map(|p| p.name), Some("first"));
		assert_eq!(table.classify("https://www.example.com/").map(|p| p.name), Some("second"));

		let reversed = ProviderTable::new(&[defs[1], defs[0]]);
		assert_eq!(reversed.classify("https://sso.example.com/login").map(|p| p.name), Some("second"));
	}

	#[test]
	fn provider_completion_checks_success_before_failure() {
		let google = provider_by_name("Google").unwrap();
		assert_eq!(classify_completion("https://app.example.com/cb?code=4/abc", Some(google)), Completion::Success);
		assert_eq!(classify_completion("https://app.example.com/cb?error=access_denied", Some(google)), Completion::Failure);
		assert_eq!(classify_completion("https://accounts.google.com/signin/v2/challenge", Some(google)), Completion::Pending);
		assert_eq!(
			classify_completion("https://app.example.com/cb?code=x&error=access_denied", Some(google)),
			Completion::Success
		);
	}

	#[test]
	fn generic_completion_reads_query_and_fragment() {
		assert_eq!(classify_completion("https://a.example/cb?state=1&code=xyz", None), Completion::Success);
		assert_eq!(classify_completion("https://a.example/cb#access_token=t&state=1", None), Completion::Success);
		assert_eq!(classify_completion("https://a.example/cb?error=access_denied", None), Completion::Failure);
		assert_eq!(classify_completion("https://a.example/cb?error=server_error", None), Completion::Pending);
		assert_eq!(classify_completion("https://a.example/cb?code=", None), Completion::Pending);
		assert_eq!(classify_completion("not a url", None), Completion::Pending);
	}

	#[test]
	fn recognizes_ats_and_verification() {
		assert_eq!(classify_ats("https://acme.wd5.myworkdayjobs.com/en-US/careers/job/123").map(|a| a.name), Some("workday"));
		assert_eq!(classify_ats("https://boards.greenhouse.io/acme/jobs/42").map(|a| a.name), Some("greenhouse"));
		assert_eq!(classify_ats("https://jobs.lever.co/acme/abc/apply").map(|a| a.name), Some("lever"));
		assert!(classify_ats("https://example.com/").is_none());

		assert!(looks_like_verification("https://example.com/account/verify-email?t=1", ""));
		assert!(looks_like_verification("https://example.com/", "Enter your verification code"));
		assert!(!looks_like_verification("https://example.com/apply", "Apply now"));
	}

	#[test]
	fn purpose_upgrade_policy() {
		let oauth = classify_context("https://accounts.google.com/o/oauth2/auth", "");
		assert_eq!(oauth.upgrade(Purpose::ExternalForm), Purpose::Oauth);

		let ats = classify_context("https://jobs.lever.co/acme/1", "");
		assert_eq!(ats.upgrade(Purpose::Unknown), Purpose::ExternalForm);
		assert_eq!(ats.upgrade(Purpose::DocumentUpload), Purpose::DocumentUpload);

		let verify = classify_context("https://example.com/", "Security check");
		assert_eq!(verify.upgrade(Purpose::Unknown), Purpose::Verification);
		assert_eq!(verify.upgrade(Purpose::Oauth), Purpose::Oauth);
	}
}
