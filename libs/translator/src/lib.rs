//! Bidirectional text-markup conversion between the transport's own markup
//! (`*bold*`, `_italic_`, `~strike~`, triple-backtick code) and helpdesk
//! markdown (`**bold**`, `*italic*`, `~~strike~~`, single-backtick code).
//!
//! Both directions are pure, total functions: text without delimiters passes
//! through unchanged, and a rewrite failure falls back to the original text
//! rather than dropping the message.
//!
//! The substitution order within each direction is a correctness property,
//! not style. Converting bold before italic keeps the single asterisks the
//! italic pass emits from being re-consumed; in the markdown direction the
//! single-asterisk italic pass must run before the bold pass for the same
//! reason, and inline code runs last. Every pattern uses negative lookaround
//! so a pass never re-matches delimiters an earlier pass just produced.

use fancy_regex::Regex;
use once_cell::sync::Lazy;
use tracing::warn;

struct Rule {
    pattern: Regex,
    open: &'static str,
    close: &'static str,
}

impl Rule {
    fn new(pattern: &str, open: &'static str, close: &'static str) -> Self {
        Self {
            pattern: Regex::new(pattern).unwrap(),
            open,
            close,
        }
    }

    fn apply(&self, text: &str) -> Result<String, fancy_regex::Error> {
        let mut out = String::with_capacity(text.len() + 8);
        let mut last = 0usize;
        for caps in self.pattern.captures_iter(text) {
            let caps = caps?;
            let (Some(whole), Some(inner)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            out.push_str(&text[last..whole.start()]);
            out.push_str(self.open);
            out.push_str(inner.as_str());
            out.push_str(self.close);
            last = whole.end();
        }
        out.push_str(&text[last..]);
        Ok(out)
    }
}

// Transport markup -> helpdesk markdown. Bold first, then italic.
static TO_HELPDESK: Lazy<Vec<Rule>> = Lazy::new(|| {
    vec![
        Rule::new(r"(?<!\*)\*(?!\s)([^*\n]+?)(?<!\s)\*(?!\*)", "**", "**"),
        Rule::new(r"(?<!_)_(?!\s)([^_\n]+?)(?<!\s)_(?!_)", "*", "*"),
        Rule::new(r"(?<!~)~(?!\s)([^~\n]+?)(?<!\s)~(?!~)", "~~", "~~"),
        Rule::new(r"```([^`]+?)```", "`", "`"),
    ]
});

// Helpdesk markdown -> transport markup. Single-asterisk italic before
// double-asterisk bold, inline code last.
static TO_TRANSPORT: Lazy<Vec<Rule>> = Lazy::new(|| {
    vec![
        Rule::new(r"(?<!\*)\*(?!\*)(?!\s)([^*\n]+?)(?<!\s)\*(?!\*)", "_", "_"),
        Rule::new(r"\*\*(?!\s)([^*\n]+?)(?<!\s)\*\*", "*", "*"),
        Rule::new(r"(?<!~)~~(?!\s)([^~\n]+?)(?<!\s)~~(?!~)", "~", "~"),
        Rule::new(r"(?<!`)`(?!`)([^`\n]+?)`(?!`)", "```", "```"),
    ]
});

fn rewrite(text: &str, rules: &[Rule], direction: &'static str) -> String {
    let mut current = text.to_string();
    for rule in rules {
        match rule.apply(&current) {
            Ok(next) => current = next,
            Err(err) => {
                warn!(error = %err, direction, "markup rewrite failed; keeping original text");
                return text.to_string();
            }
        }
    }
    current
}

/// Converts transport markup into helpdesk markdown.
///
/// ```
/// use wab_translator::to_helpdesk_markdown;
///
/// assert_eq!(to_helpdesk_markdown("*bold*"), "**bold**");
/// assert_eq!(to_helpdesk_markdown("no markup"), "no markup");
/// ```
pub fn to_helpdesk_markdown(text: &str) -> String {
    rewrite(text, &TO_HELPDESK, "to_helpdesk")
}

/// Converts helpdesk markdown into transport markup.
///
/// ```
/// use wab_translator::to_transport_markup;
///
/// assert_eq!(to_transport_markup("**bold**"), "*bold*");
/// ```
pub fn to_transport_markup(text: &str) -> String {
    rewrite(text, &TO_TRANSPORT, "to_transport")
}
