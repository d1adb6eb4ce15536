//! Glyph detection over document text
//!
//! The parser walks the text nodes of a subtree, finds emoji candidates and
//! asks a [`GlyphResolver`] what each should become. A resolver answer of
//! `None` leaves the text untouched; `Some(src)` turns the glyph into an
//! `img` placeholder carrying the marker class and the original text.

use crate::dom::{Document, Fragment, NodeId};
use crate::key::{is_regional_indicator, ResourceKey};
use std::ops::Range;

/// Tags whose text is never rewritten
const SKIPPED_TAGS: &[&str] = &[
    "iframe", "noframes", "noscript", "script", "select", "style", "textarea",
];

/// Per-candidate callback the parser consults
///
/// Called synchronously while the document is being rewritten, so
/// implementations must answer immediately.
pub trait GlyphResolver {
    fn resolve(&self, key: &ResourceKey) -> Option<String>;
}

/// Settings passed through to generated placeholders
#[derive(Debug, Clone)]
pub struct ParseOptions {
    /// Class given to every generated placeholder
    pub class_name: String,
}

/// Detector/parser interface
pub trait GlyphParser: Send + Sync {
    /// Rewrite matches below `root`, returning how many were replaced
    fn parse(
        &self,
        doc: &mut dyn Document,
        root: NodeId,
        options: &ParseOptions,
        resolver: &dyn GlyphResolver,
    ) -> usize;
}

/// Twemoji-style parser: regional indicator pairs and pictographs
#[derive(Debug, Clone, Copy, Default)]
pub struct EmojiParser;

impl GlyphParser for EmojiParser {
    fn parse(
        &self,
        doc: &mut dyn Document,
        root: NodeId,
        options: &ParseOptions,
        resolver: &dyn GlyphResolver,
    ) -> usize {
        let mut replaced = 0;

        for node in doc.text_nodes_within(root) {
            if inside_skipped_tag(doc, node) {
                continue;
            }
            let Some(text) = doc.text(node).map(str::to_string) else {
                continue;
            };

            let mut fragments = Vec::new();
            let mut last = 0;
            for range in candidates(&text) {
                let glyph = &text[range.clone()];
                let Some(src) = resolver.resolve(&ResourceKey::from_glyph(glyph)) else {
                    continue;
                };

                if range.start > last {
                    fragments.push(Fragment::Text(text[last..range.start].to_string()));
                }
                fragments.push(Fragment::Image {
                    class: options.class_name.clone(),
                    alt: glyph.to_string(),
                    src,
                });
                last = range.end;
                replaced += 1;
            }

            if fragments.is_empty() {
                continue;
            }
            if last < text.len() {
                fragments.push(Fragment::Text(text[last..].to_string()));
            }
            doc.replace_text(node, fragments);
        }

        replaced
    }
}

fn inside_skipped_tag(doc: &dyn Document, node: NodeId) -> bool {
    let mut current = doc.parent(node);
    while let Some(id) = current {
        if doc
            .tag_name(id)
            .is_some_and(|tag| SKIPPED_TAGS.contains(&tag.to_ascii_lowercase().as_str()))
        {
            return true;
        }
        current = doc.parent(id);
    }
    false
}

fn is_pictographic(code_point: u32) -> bool {
    matches!(code_point, 0x1F300..=0x1FAFF | 0x2600..=0x27BF)
}

/// Byte ranges of emoji candidates in `text`
///
/// A regional indicator pairs with the one after it; any other indicator or
/// pictograph stands alone. A trailing U+FE0F belongs to the candidate.
pub fn candidates(text: &str) -> Vec<Range<usize>> {
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    let is_indicator = |i: usize| {
        chars
            .get(i)
            .is_some_and(|(_, c)| is_regional_indicator(u32::from(*c)))
    };

    let mut ranges = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let (start, c) = chars[i];
        let len = if is_indicator(i) && is_indicator(i + 1) {
            2
        } else if is_indicator(i) || is_pictographic(u32::from(c)) {
            1
        } else {
            i += 1;
            continue;
        };

        let mut next = i + len;
        if chars.get(next).is_some_and(|(_, c)| *c == '\u{FE0F}') {
            next += 1;
        }
        let end = chars.get(next).map_or(text.len(), |(offset, _)| *offset);

        ranges.push(start..end);
        i = next;
    }
    ranges
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::Dom;
    use std::cell::RefCell;

    /// Substitutes flags only, recording every key it was asked about
    #[derive(Default)]
    struct FlagsOnly {
        asked: RefCell<Vec<String>>,
    }

    impl GlyphResolver for FlagsOnly {
        fn resolve(&self, key: &ResourceKey) -> Option<String> {
            self.asked.borrow_mut().push(key.to_string());
            key.is_flag().then(|| format!("src:{}", key))
        }
    }

    fn options() -> ParseOptions {
        ParseOptions {
            class_name: "fc-flag".to_string(),
        }
    }

    fn doc_with(text: &str) -> (Dom, NodeId) {
        let mut dom = Dom::new();
        let p = dom.create_element("p");
        let t = dom.create_text(text);
        dom.append_child(p, t);
        let root = dom.root();
        dom.append_child(root, p);
        (dom, p)
    }

    #[test]
    fn candidates_pair_regional_indicators() {
        let text = "🇦🇺🇳🇿";
        let ranges = candidates(text);
        assert_eq!(ranges.len(), 2);
        assert_eq!(&text[ranges[0].clone()], "🇦🇺");
        assert_eq!(&text[ranges[1].clone()], "🇳🇿");
    }

    #[test]
    fn candidates_include_singles_and_variation_selector() {
        let text = "a\u{2764}\u{FE0F}b🇦 c";
        let glyphs: Vec<&str> = candidates(text).into_iter().map(|r| &text[r]).collect();
        assert_eq!(glyphs, vec!["\u{2764}\u{FE0F}", "🇦"]);
    }

    #[test]
    fn parse_replaces_flags_only() {
        let (mut dom, p) = doc_with("Hi 🇦🇺 and 😀!");
        let resolver = FlagsOnly::default();

        let replaced = EmojiParser.parse(&mut dom, p, &options(), &resolver);

        assert_eq!(replaced, 1);
        assert_eq!(*resolver.asked.borrow(), vec!["1f1e6-1f1fa", "1f600"]);
        assert_eq!(
            dom.to_html(p),
            "<p>Hi <img alt=\"🇦🇺\" class=\"fc-flag\" draggable=\"false\" src=\"src:1f1e6-1f1fa\"/> and 😀!</p>"
        );
    }

    #[test]
    fn parse_leaves_plain_text_alone() {
        let (mut dom, p) = doc_with("nothing to see");
        let replaced = EmojiParser.parse(&mut dom, p, &options(), &FlagsOnly::default());

        assert_eq!(replaced, 0);
        assert_eq!(dom.to_html(p), "<p>nothing to see</p>");
    }

    #[test]
    fn parse_skips_script_text() {
        let mut dom = Dom::new();
        let script = dom.create_element("script");
        let t = dom.create_text("var f = '🇦🇺';");
        dom.append_child(script, t);
        let root = dom.root();
        dom.append_child(root, script);

        let replaced = EmojiParser.parse(&mut dom, root, &options(), &FlagsOnly::default());
        assert_eq!(replaced, 0);
    }

    #[test]
    fn parse_accepts_text_node_root() {
        let (mut dom, p) = doc_with("🇯🇵");
        let text_node = dom.children(p)[0];

        let replaced = EmojiParser.parse(&mut dom, text_node, &options(), &FlagsOnly::default());
        assert_eq!(replaced, 1);
        assert_eq!(dom.elements_with_class(p, "fc-flag").len(), 1);
    }
}
