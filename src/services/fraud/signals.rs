//! 风控信号计算（纯函数）
//!
//! 每类信号输出 [0,1] 的子分数以及对应的证据；数据库查询由 FraudScorer 负责。

use once_cell::sync::Lazy;
use regex::Regex;
use woothee::parser::Parser;

use super::rules::{FraudPolicy, FraudRuleType as R};
use crate::services::reputation::IpReputation;
use crate::storage::{
    BotTrafficDetails, ClickSpamDetails, DuplicateConversionDetails, FraudDetails, FraudType,
    IpAbuseDetails, ProxyNetworkDetails, SuspiciousPatternDetails,
};

/// 已知自动化客户端签名
static BOT_SIGNATURES: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    [
        ("headless_browser", r"(?i)headless|phantomjs|slimerjs"),
        ("automation", r"(?i)selenium|webdriver|puppeteer|playwright|cypress"),
        ("crawler", r"(?i)bot\b|crawler|spider|scraper|slurp|archiver"),
        ("scrapy", r"(?i)scrapy"),
        ("curl", r"(?i)^curl/|\bcurl\b"),
        ("wget", r"(?i)wget"),
        ("python", r"(?i)python-requests|python-urllib|aiohttp|httpx"),
        ("go", r"(?i)go-http-client"),
        ("java", r"(?i)^java/|okhttp|apache-httpclient"),
        ("node", r"(?i)node-fetch|axios|undici"),
        ("perl", r"(?i)libwww-perl"),
        ("api_client", r"(?i)postmanruntime|insomnia"),
    ]
    .into_iter()
    .filter_map(|(name, pattern)| Regex::new(pattern).ok().map(|re| (name, re)))
    .collect()
});

static BROWSER_TOKEN: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(r"(?i)mozilla/|opera|applewebkit|gecko/|chrome/|safari/|firefox/|edg/").ok()
});

/// 保证分数在 [0,1]，NaN 视为 0
pub fn clamp_score(score: f64) -> f64 {
    if score.is_nan() {
        0.0
    } else {
        score.clamp(0.0, 1.0)
    }
}

/// 一条命中证据及其原始分值
#[derive(Debug, Clone, PartialEq)]
pub struct Finding {
    pub details: FraudDetails,
    pub points: f64,
}

/// 单类信号的结果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubScore {
    pub score: f64,
    pub findings: Vec<Finding>,
}

impl SubScore {
    fn from_findings(findings: Vec<Finding>) -> Self {
        let total: f64 = findings.iter().map(|f| f.points).sum();
        Self {
            score: clamp_score(total),
            findings,
        }
    }
}

// ============ IP ============

#[derive(Debug, Clone, Default)]
pub struct IpSignals {
    pub ip: String,
    pub clicks_24h: u64,
    pub conversions_24h: u64,
    pub private_network: bool,
    /// None = 未知（超时 / 查询失败）
    pub reputation: Option<IpReputation>,
}

pub fn score_ip(policy: &FraudPolicy, signals: &IpSignals) -> SubScore {
    let mut abuse = 0.0;
    if policy.exceeds(R::IpClicksHigh, signals.clicks_24h as f64) {
        abuse += policy.weight(R::IpClicksHigh);
    } else if policy.exceeds(R::IpClicksElevated, signals.clicks_24h as f64) {
        abuse += policy.weight(R::IpClicksElevated);
    }
    if policy.exceeds(R::IpConversionsHigh, signals.conversions_24h as f64) {
        abuse += policy.weight(R::IpConversionsHigh);
    } else if policy.exceeds(R::IpConversionsElevated, signals.conversions_24h as f64) {
        abuse += policy.weight(R::IpConversionsElevated);
    }
    if policy.applies(R::IpPrivateNetwork, signals.private_network) {
        abuse += policy.weight(R::IpPrivateNetwork);
    }

    let (proxy, datacenter) = signals
        .reputation
        .as_ref()
        .map(|r| (r.proxy, r.datacenter))
        .unwrap_or((false, false));
    let mut network = 0.0;
    if policy.applies(R::IpProxy, proxy) {
        network += policy.weight(R::IpProxy);
    }
    if policy.applies(R::IpDatacenter, datacenter) {
        network += policy.weight(R::IpDatacenter);
    }

    let mut findings = Vec::new();
    if abuse > 0.0 {
        findings.push(Finding {
            details: FraudDetails::IpAbuse(IpAbuseDetails {
                ip: signals.ip.clone(),
                clicks_24h: signals.clicks_24h,
                conversions_24h: signals.conversions_24h,
                private_network: signals.private_network,
            }),
            points: abuse,
        });
    }
    if network > 0.0 {
        findings.push(Finding {
            details: FraudDetails::ProxyNetwork(ProxyNetworkDetails {
                ip: signals.ip.clone(),
                proxy,
                datacenter,
            }),
            points: network,
        });
    }
    SubScore::from_findings(findings)
}

// ============ User agent ============

pub fn match_bot_signature(user_agent: &str) -> Option<&'static str> {
    BOT_SIGNATURES
        .iter()
        .find(|(_, re)| re.is_match(user_agent))
        .map(|(name, _)| *name)
}

fn is_crawler_category(user_agent: &str) -> bool {
    Parser::new()
        .parse(user_agent)
        .is_some_and(|result| result.category == "crawler")
}

fn has_browser_token(user_agent: &str) -> bool {
    BROWSER_TOKEN
        .as_ref()
        .is_some_and(|re| re.is_match(user_agent))
}

/// 缺失的 UA 按空字符串处理（过短且没有浏览器标识）
pub fn score_user_agent(policy: &FraudPolicy, user_agent: Option<&str>) -> SubScore {
    let ua = user_agent.unwrap_or("").trim();

    let signature = match_bot_signature(ua);
    let mut points = 0.0;

    let signature_hit = policy.applies(R::UaBotSignature, signature.is_some());
    if signature_hit {
        points += policy.weight(R::UaBotSignature);
    }
    // 签名未命中时才参考 woothee 的分类
    let crawler_category = !signature_hit
        && policy.applies(R::UaCrawler, !ua.is_empty() && is_crawler_category(ua));
    if crawler_category {
        points += policy.weight(R::UaCrawler);
    }
    let too_short = policy.below(R::UaTooShort, ua.chars().count() as f64);
    if too_short {
        points += policy.weight(R::UaTooShort);
    }
    let missing_browser_token = policy.applies(R::UaNoBrowserToken, !has_browser_token(ua));
    if missing_browser_token {
        points += policy.weight(R::UaNoBrowserToken);
    }

    if points <= 0.0 {
        return SubScore::default();
    }

    SubScore::from_findings(vec![Finding {
        details: FraudDetails::BotTraffic(BotTrafficDetails {
            user_agent: ua.chars().take(256).collect(),
            signature: signature.filter(|_| signature_hit).map(str::to_string),
            crawler_category,
            too_short,
            missing_browser_token,
        }),
        points,
    }])
}

// ============ Click pattern ============

#[derive(Debug, Clone, Copy, Default)]
pub struct ClickPatternSignals {
    pub referral_clicks_1h: u64,
    pub same_ip_clicks_1h: u64,
    pub same_ua_clicks_1h: u64,
}

pub fn score_click_pattern(policy: &FraudPolicy, signals: &ClickPatternSignals) -> SubScore {
    let mut points = 0.0;
    if policy.exceeds(R::ClickReferralBurst, signals.referral_clicks_1h as f64) {
        points += policy.weight(R::ClickReferralBurst);
    }
    if policy.exceeds(R::ClickSameIpBurst, signals.same_ip_clicks_1h as f64) {
        points += policy.weight(R::ClickSameIpBurst);
    }
    if policy.exceeds(R::ClickSameUaBurst, signals.same_ua_clicks_1h as f64) {
        points += policy.weight(R::ClickSameUaBurst);
    }

    if points <= 0.0 {
        return SubScore::default();
    }

    SubScore::from_findings(vec![Finding {
        details: FraudDetails::ClickSpam(ClickSpamDetails {
            referral_clicks_1h: signals.referral_clicks_1h,
            same_ip_clicks_1h: signals.same_ip_clicks_1h,
            same_ua_clicks_1h: signals.same_ua_clicks_1h,
        }),
        points,
    }])
}

// ============ Conversion pattern ============

pub fn score_conversion_pattern(
    policy: &FraudPolicy,
    seconds_since_click: Option<i64>,
    purchase_amount: Option<i64>,
) -> SubScore {
    let mut points = 0.0;
    if let Some(secs) = seconds_since_click {
        if policy.below(R::ConversionTooFast, secs as f64) {
            points += policy.weight(R::ConversionTooFast);
        } else if policy.below(R::ConversionFast, secs as f64) {
            points += policy.weight(R::ConversionFast);
        }
    }
    let large_purchase =
        purchase_amount.is_some_and(|amount| policy.reaches(R::ConversionLargeAmount, amount as f64));
    if large_purchase {
        points += policy.weight(R::ConversionLargeAmount);
    }

    if points <= 0.0 {
        return SubScore::default();
    }

    SubScore::from_findings(vec![Finding {
        details: FraudDetails::SuspiciousPattern(SuspiciousPatternDetails {
            seconds_since_click,
            purchase_amount,
            large_purchase,
        }),
        points,
    }])
}

/// 同一推荐链接 24h 内相同 IP 或相同 UA 已有转化
pub fn duplicate_conversion(
    same_ip_conversions_24h: u64,
    same_ua_conversions_24h: u64,
) -> Option<FraudDetails> {
    (same_ip_conversions_24h > 0 || same_ua_conversions_24h > 0).then(|| {
        FraudDetails::DuplicateConversion(DuplicateConversionDetails {
            same_ip_conversions_24h,
            same_ua_conversions_24h,
        })
    })
}

// ============ Composite ============

/// 综合分及按贡献排序的命中类型
#[derive(Debug, Clone, PartialEq)]
pub struct Composite {
    pub risk_score: f64,
    pub contributions: Vec<(FraudType, f64)>,
    pub details: Vec<FraudDetails>,
}

fn weighted(contributions: &mut Vec<(FraudType, f64)>, sub: &SubScore, weight: f64) {
    for finding in &sub.findings {
        let contribution = finding.points * weight;
        if contribution > 0.0 {
            contributions.push((finding.details.fraud_type(), contribution));
        }
    }
}

fn finish(
    score: f64,
    mut contributions: Vec<(FraudType, f64)>,
    details: Vec<FraudDetails>,
) -> Composite {
    contributions.sort_by(|a, b| b.1.total_cmp(&a.1));
    let mut seen = Vec::new();
    contributions.retain(|(t, _)| {
        if seen.contains(t) {
            false
        } else {
            seen.push(*t);
            true
        }
    });
    Composite {
        risk_score: clamp_score(score),
        contributions,
        details,
    }
}

fn ip_clicks_24h(ip: &SubScore) -> Option<u64> {
    ip.findings.iter().find_map(|f| match &f.details {
        FraudDetails::IpAbuse(d) => Some(d.clicks_24h),
        _ => None,
    })
}

/// click = IP×0.4 + UA×0.3 + pattern×0.3，24h 高频 IP 另有下限
pub fn composite_click(
    policy: &FraudPolicy,
    ip: &SubScore,
    ua: &SubScore,
    pattern: &SubScore,
) -> Composite {
    let (w_ip, w_ua, w_pattern) = (
        policy.weight(R::ClickWeightIp),
        policy.weight(R::ClickWeightUa),
        policy.weight(R::ClickWeightPattern),
    );
    let mut score = ip.score * w_ip + ua.score * w_ua + pattern.score * w_pattern;

    let mut contributions = Vec::new();
    weighted(&mut contributions, ip, w_ip);
    weighted(&mut contributions, ua, w_ua);
    weighted(&mut contributions, pattern, w_pattern);

    // 单个 IP 的 24h 点击量本身足以判定滥用，不依赖最近一小时的突发
    if let Some(clicks_24h) = ip_clicks_24h(ip)
        && policy.exceeds(R::ClickIpVolumeFloor, clicks_24h as f64)
    {
        let floor = policy.weight(R::ClickIpVolumeFloor);
        if score < floor {
            let lift = floor - score;
            score = floor;
            match contributions.iter_mut().find(|(t, _)| *t == FraudType::IpAbuse) {
                Some((_, c)) => *c += lift,
                None => contributions.push((FraudType::IpAbuse, lift)),
            }
        }
    }

    let details = [ip, ua, pattern]
        .iter()
        .flat_map(|s| s.findings.iter().map(|f| f.details.clone()))
        .collect();
    finish(score, contributions, details)
}

/// conversion = IP×0.3 + UA×0.2 + pattern×0.3 + 重复转化惩罚 + 过快转化惩罚
pub fn composite_conversion(
    policy: &FraudPolicy,
    ip: &SubScore,
    ua: &SubScore,
    pattern: &SubScore,
    duplicate: Option<&FraudDetails>,
    seconds_since_click: Option<i64>,
) -> Composite {
    let (w_ip, w_ua, w_pattern) = (
        policy.weight(R::ConversionWeightIp),
        policy.weight(R::ConversionWeightUa),
        policy.weight(R::ConversionWeightPattern),
    );
    let mut score = ip.score * w_ip + ua.score * w_ua + pattern.score * w_pattern;

    let mut contributions = Vec::new();
    weighted(&mut contributions, ip, w_ip);
    weighted(&mut contributions, ua, w_ua);
    weighted(&mut contributions, pattern, w_pattern);

    let mut details: Vec<FraudDetails> = [ip, ua, pattern]
        .iter()
        .flat_map(|s| s.findings.iter().map(|f| f.details.clone()))
        .collect();

    if let Some(dup) = duplicate {
        let penalty = policy.weight(R::ConversionDuplicatePenalty);
        if penalty > 0.0 {
            score += penalty;
            contributions.push((FraudType::DuplicateConversion, penalty));
            details.push(dup.clone());
        }
    }

    if let Some(secs) = seconds_since_click
        && policy.below(R::ConversionTooFastPenalty, secs as f64)
    {
        let penalty = policy.weight(R::ConversionTooFastPenalty);
        score += penalty;
        if penalty > 0.0 {
            contributions.push((FraudType::SuspiciousPattern, penalty));
        }
    }

    finish(score, contributions, details)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::FraudRule;

    const CHROME_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36";

    fn policy() -> FraudPolicy {
        FraudPolicy::default()
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_ip_volume_tiers() {
        let p = policy();
        let high = score_ip(
            &p,
            &IpSignals {
                ip: "203.0.113.7".into(),
                clicks_24h: 51,
                ..Default::default()
            },
        );
        assert!(approx(high.score, 0.4));
        assert_eq!(high.findings[0].details.fraud_type(), FraudType::IpAbuse);

        let elevated = score_ip(
            &p,
            &IpSignals {
                clicks_24h: 21,
                conversions_24h: 3,
                ..Default::default()
            },
        );
        assert!(approx(elevated.score, 0.35));

        let quiet = score_ip(
            &p,
            &IpSignals {
                clicks_24h: 20,
                conversions_24h: 2,
                ..Default::default()
            },
        );
        assert_eq!(quiet, SubScore::default());
    }

    #[test]
    fn test_ip_reputation_and_private_network() {
        let p = policy();
        let scored = score_ip(
            &p,
            &IpSignals {
                ip: "10.0.0.1".into(),
                private_network: true,
                reputation: Some(IpReputation {
                    proxy: true,
                    datacenter: true,
                    ..Default::default()
                }),
                ..Default::default()
            },
        );
        assert!(approx(scored.score, 0.6));
        let types: Vec<_> = scored.findings.iter().map(|f| f.details.fraud_type()).collect();
        assert_eq!(types, vec![FraudType::IpAbuse, FraudType::ProxyNetwork]);

        // 未知信誉不加分
        let unknown = score_ip(&p, &IpSignals::default());
        assert_eq!(unknown.score, 0.0);
    }

    #[test]
    fn test_ip_score_is_clamped() {
        let p = FraudPolicy::from_rules(&[FraudRule {
            rule_type: "ip_clicks_high".into(),
            threshold: 0.0,
            weight: 5.0,
            active: true,
        }]);
        let scored = score_ip(
            &p,
            &IpSignals {
                clicks_24h: 10,
                ..Default::default()
            },
        );
        assert_eq!(scored.score, 1.0);
    }

    #[test]
    fn test_user_agent_signatures() {
        let p = policy();
        assert_eq!(match_bot_signature("python-requests/2.31"), Some("python"));
        assert_eq!(
            match_bot_signature("Mozilla/5.0 HeadlessChrome/120.0"),
            Some("headless_browser")
        );
        assert_eq!(match_bot_signature(CHROME_UA), None);

        let curl = score_user_agent(&p, Some("curl/8.4.0"));
        // 签名 0.8 + 过短 0.3 + 无浏览器标识 0.2，截断到 1
        assert_eq!(curl.score, 1.0);

        let chrome = score_user_agent(&p, Some(CHROME_UA));
        assert_eq!(chrome, SubScore::default());
    }

    #[test]
    fn test_missing_user_agent() {
        let scored = score_user_agent(&policy(), None);
        assert!(approx(scored.score, 0.5));
        match &scored.findings[0].details {
            FraudDetails::BotTraffic(d) => {
                assert!(d.too_short && d.missing_browser_token);
                assert!(d.signature.is_none());
            }
            other => panic!("unexpected details {other:?}"),
        }
    }

    #[test]
    fn test_woothee_crawler_without_signature() {
        // woothee 识别为 crawler，但不匹配任何签名
        let ua = "Mozilla/5.0 (compatible; Yahoo! Slurp; http://help.yahoo.com/help/us/ysearch/slurp)";
        let p = FraudPolicy::from_rules(&[FraudRule {
            rule_type: "ua_bot_signature".into(),
            threshold: 0.0,
            weight: 0.8,
            active: false,
        }]);
        let scored = score_user_agent(&p, Some(ua));
        match &scored.findings[0].details {
            FraudDetails::BotTraffic(d) => assert!(d.crawler_category),
            other => panic!("unexpected details {other:?}"),
        }
    }

    #[test]
    fn test_click_pattern() {
        let p = policy();
        let scored = score_click_pattern(
            &p,
            &ClickPatternSignals {
                referral_clicks_1h: 51,
                same_ip_clicks_1h: 51,
                same_ua_clicks_1h: 51,
            },
        );
        assert!(approx(scored.score, 0.9));

        let burst = score_click_pattern(
            &p,
            &ClickPatternSignals {
                referral_clicks_1h: 101,
                same_ip_clicks_1h: 11,
                same_ua_clicks_1h: 21,
            },
        );
        assert_eq!(burst.score, 1.0);
    }

    #[test]
    fn test_conversion_pattern_timing() {
        let p = policy();
        assert!(approx(score_conversion_pattern(&p, Some(5), None).score, 0.8));
        assert!(approx(score_conversion_pattern(&p, Some(20), None).score, 0.4));
        assert_eq!(score_conversion_pattern(&p, Some(120), None).score, 0.0);
        assert_eq!(score_conversion_pattern(&p, None, None).score, 0.0);

        let large = score_conversion_pattern(&p, Some(120), Some(100_000));
        assert!(approx(large.score, 0.1));
    }

    #[test]
    fn test_composite_click_51_click_scenario() {
        let p = policy();
        let ip = score_ip(
            &p,
            &IpSignals {
                ip: "203.0.113.7".into(),
                clicks_24h: 51,
                ..Default::default()
            },
        );
        let ua = score_user_agent(&p, Some(CHROME_UA));
        let pattern = score_click_pattern(
            &p,
            &ClickPatternSignals {
                referral_clicks_1h: 51,
                same_ip_clicks_1h: 51,
                same_ua_clicks_1h: 51,
            },
        );
        let composite = composite_click(&p, &ip, &ua, &pattern);
        assert!(composite.risk_score >= 0.4);
        assert!(approx(composite.risk_score, 0.43));
        let types: Vec<_> = composite.contributions.iter().map(|(t, _)| *t).collect();
        assert!(types.contains(&FraudType::IpAbuse));
        assert_eq!(types[0], FraudType::ClickSpam);
    }

    #[test]
    fn test_composite_click_ip_volume_floor_without_burst() {
        let p = policy();
        let ip = score_ip(
            &p,
            &IpSignals {
                ip: "203.0.113.50".into(),
                clicks_24h: 51,
                ..Default::default()
            },
        );
        let quiet = SubScore::default();
        let composite = composite_click(&p, &ip, &quiet, &quiet);
        assert!(approx(composite.risk_score, 0.4));
        assert_eq!(composite.contributions.len(), 1);
        assert_eq!(composite.contributions[0].0, FraudType::IpAbuse);
        assert!(approx(composite.contributions[0].1, 0.4));

        // 50 次不超过阈值，只按权重计分
        let ip = score_ip(
            &p,
            &IpSignals {
                clicks_24h: 50,
                ..Default::default()
            },
        );
        let composite = composite_click(&p, &ip, &quiet, &quiet);
        assert!(approx(composite.risk_score, 0.08));

        let disabled = FraudPolicy::from_rules(&[FraudRule {
            rule_type: "click_ip_volume_floor".into(),
            threshold: 50.0,
            weight: 0.4,
            active: false,
        }]);
        let ip = score_ip(
            &disabled,
            &IpSignals {
                clicks_24h: 51,
                ..Default::default()
            },
        );
        let composite = composite_click(&disabled, &ip, &quiet, &quiet);
        assert!(approx(composite.risk_score, 0.16));
    }

    #[test]
    fn test_composite_conversion_penalties() {
        let p = policy();
        let empty = SubScore::default();
        let fast = score_conversion_pattern(&p, Some(5), None);
        let slow = score_conversion_pattern(&p, Some(120), None);

        let fast_score = composite_conversion(&p, &empty, &empty, &fast, None, Some(5));
        let slow_score = composite_conversion(&p, &empty, &empty, &slow, None, Some(120));
        assert!(approx(fast_score.risk_score, 0.54));
        assert!(fast_score.risk_score > slow_score.risk_score);

        let dup = duplicate_conversion(1, 0);
        let with_dup = composite_conversion(&p, &empty, &empty, &fast, dup.as_ref(), Some(5));
        assert!(approx(with_dup.risk_score, 0.94));
        assert!(
            with_dup
                .contributions
                .iter()
                .any(|(t, _)| *t == FraudType::DuplicateConversion)
        );
    }

    #[test]
    fn test_composite_always_clamped() {
        let p = policy();
        let full = SubScore {
            score: 1.0,
            findings: vec![],
        };
        let dup = duplicate_conversion(3, 3);
        let c = composite_conversion(&p, &full, &full, &full, dup.as_ref(), Some(0));
        assert_eq!(c.risk_score, 1.0);

        let negative = FraudPolicy::from_rules(&[FraudRule {
            rule_type: "click_weight_ip".into(),
            threshold: 0.0,
            weight: -3.0,
            active: true,
        }]);
        let c = composite_click(&negative, &full, &SubScore::default(), &SubScore::default());
        assert_eq!(c.risk_score, 0.0);
        assert_eq!(clamp_score(f64::NAN), 0.0);
    }

    #[test]
    fn test_duplicate_conversion() {
        assert!(duplicate_conversion(0, 0).is_none());
        assert!(matches!(
            duplicate_conversion(0, 2),
            Some(FraudDetails::DuplicateConversion(_))
        ));
    }
}
