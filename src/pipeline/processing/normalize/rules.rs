use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

/// Rewrites an identifier to its canonical spelling.
///
/// A rule fires when its pattern occurs anywhere in the identifier (or equals
/// it, for exact rules) and replaces the whole identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliasRule {
    pub pattern: String,
    pub canonical: String,
    #[serde(default)]
    pub exact: bool,
}

impl AliasRule {
    pub fn contains(pattern: &str, canonical: &str) -> Self {
        Self {
            pattern: pattern.to_string(),
            canonical: canonical.to_string(),
            exact: false,
        }
    }

    pub fn exact(pattern: &str, canonical: &str) -> Self {
        Self {
            pattern: pattern.to_string(),
            canonical: canonical.to_string(),
            exact: true,
        }
    }

    pub fn matches(&self, id: &str) -> bool {
        if self.exact {
            id == self.pattern
        } else {
            id.contains(&self.pattern)
        }
    }
}

/// Primary identifier rules, applied in order to the running result.
pub static DEFAULT_ID_RULES: Lazy<Vec<AliasRule>> = Lazy::new(|| {
    vec![
        // A09: IRAS names NED knows with the F prefix
        AliasRule::contains("IRAS05189-2524", "IRASF05189-2524"),
        AliasRule::contains("IRAS18293-3413", "IRASF18293-3413"),
        AliasRule::contains("13120-5453", "IRAS13120-5453"),
        AliasRule::contains("16516-0948", "IRASF16516-0948"),
        AliasRule::contains("16399-0937", "IRASF16399-0937"),
        AliasRule::contains("17138-1017", "IRASF17138-1017"),
        AliasRule::contains("10565+2448", "IRASF10565+2448"),
        // G14; NGC34 must not swallow NGC3410 and friends
        AliasRule::exact("NGC34", "NGC0034"),
        AliasRule::contains("17208-0014", "IRASF17207-0014"),
        AliasRule::contains("IRAS02512+1446", "MCG+02-08-029"),
        AliasRule::contains("IRAS09320+6134", "UGC05101"),
        AliasRule::contains("IRAS12243-0036", "NGC4418"),
        AliasRule::contains("IRAS13001-2339", "ESO507-G070"),
        AliasRule::contains("IRAS13470+3530", "UGC08739"),
        AliasRule::contains("IRAS15163+4255", "VV705"),
        AliasRule::contains("IRAS15327+2340", "Arp220"),
        AliasRule::contains("IRAS15437+0234", "NGC5990"),
        AliasRule::contains("IRAS16284+0411", "CGCG052-037"),
        AliasRule::contains("IRAS13188+0036", "NGC5104"),
        // R15
        AliasRule::contains("Arp299", "Arp299-A"),
        AliasRule::contains("Zw049.057", "CGCG049-057"),
        AliasRule::contains("IC4687", "IC4687"),
        // L17 uses UGC numbers for some well known systems
        AliasRule::contains("09913", "Arp220"),
        AliasRule::contains("08058", "Mrk231"),
        AliasRule::contains("03608", "UGC3608"),
        AliasRule::contains("08387", "Arp193"),
        AliasRule::contains("08696", "Mrk273"),
        AliasRule::contains("16381190", "ESO069-IG006"),
        // I15
        AliasRule::contains("NGC1275(PerA)", "NGC1275"),
        AliasRule::contains("MGC+12-02-001", "MCG+12-02-001"),
        // K16 pointing suffixes
        AliasRule::contains("NGC3410a", "NGC3410"),
        AliasRule::contains("NGC0232a", "NGC0232"),
        AliasRule::contains("NGC3110a", "NGC3110"),
        AliasRule::contains("NGC2388a", "NGC2388"),
        AliasRule::contains("NGC2342b", "NGC2341"),
        AliasRule::contains("NGC2342a", "NGC2342"),
        AliasRule::contains("IC4518ABa", "IC4518A"),
        AliasRule::contains("M101_02", "M101"),
        AliasRule::contains("NGC2976_00", "NGC2976"),
        AliasRule::contains("MCG+04-48-002a", "MCG+04-48-002"),
        AliasRule::contains("NGC5734a", "NGC5734"),
        AliasRule::contains("NGC7679a", "NGC7679"),
        AliasRule::contains("IC10-B11-1", "IC10"),
        AliasRule::contains("NGC0877a", "NGC0877"),
        AliasRule::contains("NGC891-1", "NGC891"),
        AliasRule::contains("NGC205-copeak", "NGC205"),
    ]
});

/// Alternate identifier rules
pub static DEFAULT_ALT_RULES: Lazy<Vec<AliasRule>> = Lazy::new(|| {
    vec![
        AliasRule::contains("MRK0331", "Mrk331"),
        AliasRule::contains("09913", "Arp220"),
        AliasRule::contains("08058", "Mrk231"),
        AliasRule::contains("08387", "Arp193"),
        AliasRule::contains("08696", "Mrk273"),
        AliasRule::contains("Arp256", "MCG-02-01-051"),
        AliasRule::contains("02369", "MCG+02-08-029"),
    ]
});

/// Apply rules in sequence; later rules see the output of earlier ones.
pub fn apply_rules(rules: &[AliasRule], id: &str) -> String {
    rules.iter().fold(id.to_string(), |current, rule| {
        if rule.matches(&current) {
            rule.canonical.clone()
        } else {
            current
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ngc34_rule_is_exact() {
        assert_eq!(apply_rules(&DEFAULT_ID_RULES, "NGC34"), "NGC0034");
        assert_eq!(apply_rules(&DEFAULT_ID_RULES, "NGC3410a"), "NGC3410");
        assert_eq!(apply_rules(&DEFAULT_ID_RULES, "NGC3448"), "NGC3448");
    }

    #[test]
    fn test_substring_rules_replace_whole_id() {
        assert_eq!(apply_rules(&DEFAULT_ID_RULES, "UGC09913"), "Arp220");
        assert_eq!(apply_rules(&DEFAULT_ID_RULES, "IRAS15327+2340"), "Arp220");
        assert_eq!(apply_rules(&DEFAULT_ID_RULES, "IRAS05189-2524"), "IRASF05189-2524");
        assert_eq!(apply_rules(&DEFAULT_ID_RULES, "NGC1275(PerA)"), "NGC1275");
        assert_eq!(apply_rules(&DEFAULT_ALT_RULES, "MRK0331"), "Mrk331");
    }

    #[test]
    fn test_rules_chain() {
        let rules = vec![AliasRule::contains("a", "b"), AliasRule::exact("b", "c")];
        assert_eq!(apply_rules(&rules, "xa"), "c");
    }
}
