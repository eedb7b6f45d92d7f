//! Declarative removal rules for the tag filter
//!
//! Each rule pairs a [`RemovalGroup`] with a [`Pattern`]. Patterns compile to
//! CSS selectors understood by the streaming rewriter. Order matters only for
//! readability; every active rule removes its matches.

/// Families of non-content markup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemovalGroup {
    /// Scripts, styles and other markup that never renders as text
    Boilerplate,
    /// Site navigation menus and breadcrumbs
    Navigation,
    /// Headers, footers and sidebars around the main content
    NonMain,
    Ads,
    CookieBanner,
    Search,
    TableOfContents,
    BackToTop,
}

impl RemovalGroup {
    /// Page chrome is only removed when the caller asks for main content;
    /// every other group is always removed.
    pub fn is_active(&self, exclude_non_main_tags: bool) -> bool {
        match self {
            Self::NonMain => exclude_non_main_tags,
            _ => true,
        }
    }
}

/// A single element-matching pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pattern {
    /// Element name, e.g. `nav`
    Tag(&'static str),
    /// ARIA role, e.g. `navigation`
    Role(&'static str),
    /// Attribute value substring, e.g. `aria-label*="cookie"`
    AttrContains(&'static str, &'static str),
    /// `*value*` match against the class attribute
    ClassWildcard(&'static str),
    /// `*value*` match against the id attribute
    IdWildcard(&'static str),
    /// `value*` match against the id attribute
    IdPrefix(&'static str),
    /// A raw CSS selector
    Css(&'static str),
}

impl Pattern {
    pub fn to_selector(&self) -> String {
        match self {
            Self::Tag(tag) => (*tag).to_string(),
            Self::Role(role) => format!("[role=\"{}\"]", role),
            Self::AttrContains(attr, value) => format!("[{}*=\"{}\"]", attr, value),
            Self::ClassWildcard(value) => format!("[class*=\"{}\"]", value),
            Self::IdWildcard(value) => format!("[id*=\"{}\"]", value),
            Self::IdPrefix(value) => format!("[id^=\"{}\"]", value),
            Self::Css(css) => (*css).to_string(),
        }
    }
}

/// A removal rule: elements matching `pattern` are excised with their content
#[derive(Debug, Clone, Copy)]
pub struct RemovalRule {
    pub group: RemovalGroup,
    pub pattern: Pattern,
}

const fn rule(group: RemovalGroup, pattern: Pattern) -> RemovalRule {
    RemovalRule { group, pattern }
}

use Pattern::*;
use RemovalGroup::*;

/// Default rule set, applied in order
pub const DEFAULT_RULES: &[RemovalRule] = &[
    rule(Boilerplate, Tag("script")),
    rule(Boilerplate, Tag("style")),
    rule(Boilerplate, Tag("noscript")),
    rule(Boilerplate, Tag("template")),
    rule(Boilerplate, Tag("iframe")),
    rule(Navigation, Tag("nav")),
    rule(Navigation, Role("navigation")),
    rule(Navigation, Role("menubar")),
    rule(Navigation, ClassWildcard("navbar")),
    rule(Navigation, ClassWildcard("breadcrumb")),
    rule(Navigation, IdWildcard("navbar")),
    rule(NonMain, Tag("header")),
    rule(NonMain, Tag("footer")),
    rule(NonMain, Tag("aside")),
    rule(NonMain, Role("banner")),
    rule(NonMain, Role("contentinfo")),
    rule(NonMain, Role("complementary")),
    rule(NonMain, ClassWildcard("sidebar")),
    rule(NonMain, ClassWildcard("site-header")),
    rule(NonMain, ClassWildcard("site-footer")),
    rule(NonMain, IdWildcard("sidebar")),
    rule(Ads, ClassWildcard("advert")),
    rule(Ads, ClassWildcard("ad-slot")),
    rule(Ads, ClassWildcard("ad-container")),
    rule(Ads, ClassWildcard("adsbygoogle")),
    rule(Ads, ClassWildcard("sponsored")),
    rule(Ads, IdWildcard("google_ads")),
    rule(Ads, IdWildcard("ad-slot")),
    rule(Ads, Css("[data-ad-slot]")),
    rule(CookieBanner, ClassWildcard("cookie-banner")),
    rule(CookieBanner, ClassWildcard("cookie-consent")),
    rule(CookieBanner, ClassWildcard("cookie-notice")),
    rule(CookieBanner, ClassWildcard("cookiebanner")),
    rule(CookieBanner, ClassWildcard("onetrust")),
    rule(CookieBanner, IdPrefix("cookie-banner")),
    rule(CookieBanner, IdPrefix("cookie-consent")),
    rule(CookieBanner, IdPrefix("cookie-notice")),
    rule(CookieBanner, IdWildcard("onetrust")),
    rule(CookieBanner, AttrContains("aria-label", "cookie")),
    rule(Search, Role("search")),
    rule(Search, Css("input[type=\"search\"]")),
    rule(Search, Css("[id=\"search\"]")),
    rule(Search, ClassWildcard("search-form")),
    rule(Search, ClassWildcard("search-box")),
    rule(Search, ClassWildcard("searchbox")),
    rule(Search, ClassWildcard("docsearch")),
    rule(TableOfContents, Css(".toc")),
    rule(TableOfContents, Css("#toc")),
    rule(TableOfContents, ClassWildcard("table-of-contents")),
    rule(TableOfContents, ClassWildcard("tableofcontents")),
    rule(TableOfContents, ClassWildcard("toc-")),
    rule(TableOfContents, AttrContains("aria-label", "Table of contents")),
    rule(BackToTop, ClassWildcard("back-to-top")),
    rule(BackToTop, ClassWildcard("backtotop")),
    rule(BackToTop, ClassWildcard("scroll-to-top")),
    rule(BackToTop, IdWildcard("back-to-top")),
    rule(BackToTop, Css("a[href=\"#top\"]")),
];

/// Compiles the selectors active for the given options
///
/// Extra selectors supplied by the caller are appended after the defaults.
pub fn active_selectors(
    rules: &[RemovalRule],
    exclude_non_main_tags: bool,
    extra: &[String],
) -> Vec<String> {
    rules
        .iter()
        .filter(|r| r.group.is_active(exclude_non_main_tags))
        .map(|r| r.pattern.to_selector())
        .chain(
            extra
                .iter()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
        )
        .collect()
}
