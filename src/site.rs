//! Site definitions: where products live on a catalog site and which fields to pull
//!
//! A site is plain data. Built-in sites are defined below; other sites can be
//! described in a CONL file and passed with `--site path/to/site.conl`:
//!
//! ```text
//! name = example
//! base_url = https://shop.example.com
//! identity_fields
//!   = article
//!   = name
//! listing
//!   items = .catalog .product
//!   href_policy = join-with-slash
//!   links
//!     = a.product-title
//!     = a
//! fields
//!   =
//!     name = name
//!     selector = h1
//!   =
//!     name = url
//!     kind = source-url
//! ```

use anyhow::{Context, Result};
use scraper::Selector;
use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::error::ConfigError;

pub const BUILTIN_SITES: &[&str] = &["manotom", "bitrix"];

/// Field name used for the detail URL when a site does not declare one
pub const DEFAULT_URL_FIELD: &str = "url";

/// How a listing href that does not start with `/` becomes a URL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HrefPolicy {
    /// Use the href verbatim
    #[default]
    AbsoluteOtherwise,
    /// Join to the base URL with a `/`
    JoinWithSlash,
}

impl HrefPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            HrefPolicy::AbsoluteOtherwise => "absolute-otherwise",
            HrefPolicy::JoinWithSlash => "join-with-slash",
        }
    }

    /// Resolve `href` against `base_url`. Any run of leading `/` joins to the
    /// base as exactly one slash, `//host/...` included.
    pub fn resolve(&self, base_url: &str, href: &str) -> String {
        let base = base_url.trim_end_matches('/');
        if href.starts_with('/') {
            return format!("{}/{}", base, href.trim_start_matches('/'));
        }
        match self {
            HrefPolicy::AbsoluteOtherwise => href.to_string(),
            HrefPolicy::JoinWithSlash => format!("{}/{}", base, href),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FieldKind {
    #[default]
    Text,
    Pairs,
    Flag,
    SourceUrl,
}

impl FieldKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKind::Text => "text",
            FieldKind::Pairs => "pairs",
            FieldKind::Flag => "flag",
            FieldKind::SourceUrl => "source-url",
        }
    }
}

/// One output column as written in a site definition
#[derive(Debug, Clone, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    #[serde(default)]
    pub kind: FieldKind,
    /// Element selector (for `pairs`: the name elements)
    pub selector: Option<String>,
    /// Value elements for `pairs`
    pub values: Option<String>,
    pub yes: Option<String>,
    pub no: Option<String>,
}

impl FieldSpec {
    pub fn text(name: &str, selector: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: FieldKind::Text,
            selector: Some(selector.to_string()),
            values: None,
            yes: None,
            no: None,
        }
    }

    pub fn pairs(name: &str, names: &str, values: &str) -> Self {
        Self {
            kind: FieldKind::Pairs,
            values: Some(values.to_string()),
            ..Self::text(name, names)
        }
    }

    pub fn flag(name: &str, selector: &str, yes: &str, no: &str) -> Self {
        Self {
            kind: FieldKind::Flag,
            yes: Some(yes.to_string()),
            no: Some(no.to_string()),
            ..Self::text(name, selector)
        }
    }

    pub fn source_url(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: FieldKind::SourceUrl,
            selector: None,
            values: None,
            yes: None,
            no: None,
        }
    }

    fn required<'a>(&self, key: &'static str, value: &'a Option<String>) -> Result<&'a str, ConfigError> {
        value.as_deref().ok_or_else(|| ConfigError::MissingSelector {
            field: self.name.clone(),
            key,
        })
    }

    fn compile(&self) -> Result<Field, ConfigError> {
        let owner = format!("field '{}'", self.name);
        let selector = || parse_selector(&owner, self.required("selector", &self.selector)?);

        let rule = match self.kind {
            FieldKind::Text => FieldRule::Text(selector()?),
            FieldKind::Pairs => FieldRule::Pairs {
                names: selector()?,
                values: parse_selector(&owner, self.required("values", &self.values)?)?,
            },
            FieldKind::Flag => FieldRule::Flag {
                selector: selector()?,
                yes: self.yes.clone().unwrap_or_else(|| "yes".to_string()),
                no: self.no.clone().unwrap_or_else(|| "no".to_string()),
            },
            FieldKind::SourceUrl => FieldRule::SourceUrl,
        };

        Ok(Field {
            name: self.name.clone(),
            rule,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListingSpec {
    /// Selector for one product entry on a listing page
    pub items: String,
    /// Link selectors tried in order inside each entry
    pub links: Vec<String>,
    #[serde(default)]
    pub href_policy: HrefPolicy,
}

/// A catalog site as configured, before selectors are compiled
#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    pub name: String,
    pub base_url: Option<String>,
    pub listing: ListingSpec,
    pub fields: Vec<FieldSpec>,
    pub identity_fields: Vec<String>,
    /// Catalog paths walked when none are given on the command line
    #[serde(default)]
    pub sections: Vec<String>,
}

impl SiteConfig {
    pub fn builtin(name: &str) -> Option<Self> {
        match name {
            "manotom" => Some(manotom()),
            "bitrix" => Some(bitrix()),
            _ => None,
        }
    }

    /// Load a site definition from a CONL file
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read site file: {}", path.display()))?;
        Self::from_conl(&content)
            .with_context(|| format!("Failed to parse site file: {}", path.display()))
    }

    pub fn from_conl(content: &str) -> Result<Self> {
        Ok(serde_conl::from_str(content)?)
    }

    /// Resolve `--site`: a built-in name, or a path to a CONL file
    pub fn resolve(site: &str) -> Result<Self> {
        if let Some(config) = Self::builtin(site) {
            return Ok(config);
        }
        let path = Path::new(site);
        if path.exists() {
            return Self::load_from_path(path);
        }
        anyhow::bail!(
            "Unknown site '{}'. Built-in sites: {}; or pass a path to a .conl file.",
            site,
            BUILTIN_SITES.join(", ")
        )
    }

    /// Compile selectors. `base_url` overrides the configured one.
    pub fn compile(self, base_url: Option<String>) -> Result<Site, ConfigError> {
        let base_url = base_url
            .or(self.base_url)
            .ok_or_else(|| ConfigError::MissingBaseUrl {
                site: self.name.clone(),
            })?;

        if self.listing.links.is_empty() {
            return Err(ConfigError::NoLinkSelectors { site: self.name });
        }
        let listing = Listing {
            items: parse_selector("listing items", &self.listing.items)?,
            links: self
                .listing
                .links
                .iter()
                .map(|css| parse_selector("listing links", css))
                .collect::<Result<_, _>>()?,
            href_policy: self.listing.href_policy,
        };

        let fields = self
            .fields
            .iter()
            .map(FieldSpec::compile)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Site {
            name: self.name,
            base_url,
            listing,
            field_map: FieldMap::new(fields),
            identity_fields: self.identity_fields,
            sections: self.sections,
        })
    }
}

fn parse_selector(owner: &str, css: &str) -> Result<Selector, ConfigError> {
    Selector::parse(css).map_err(|e| ConfigError::InvalidSelector {
        owner: owner.to_string(),
        selector: css.to_string(),
        message: e.to_string(),
    })
}

#[derive(Debug, Clone)]
pub enum FieldRule {
    Text(Selector),
    Pairs { names: Selector, values: Selector },
    Flag { selector: Selector, yes: String, no: String },
    SourceUrl,
}

#[derive(Debug, Clone)]
pub struct Field {
    pub name: String,
    pub rule: FieldRule,
}

/// Compiled, ordered field list. Always carries the detail URL.
#[derive(Debug, Clone)]
pub struct FieldMap {
    fields: Vec<Field>,
}

impl FieldMap {
    pub fn new(mut fields: Vec<Field>) -> Self {
        if !fields.iter().any(|f| matches!(f.rule, FieldRule::SourceUrl)) {
            fields.push(Field {
                name: DEFAULT_URL_FIELD.to_string(),
                rule: FieldRule::SourceUrl,
            });
        }
        Self { fields }
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    #[cfg(test)]
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct Listing {
    pub items: Selector,
    pub links: Vec<Selector>,
    pub href_policy: HrefPolicy,
}

/// A site ready to walk
#[derive(Debug, Clone)]
pub struct Site {
    pub name: String,
    pub base_url: String,
    pub listing: Listing,
    pub field_map: FieldMap,
    pub identity_fields: Vec<String>,
    pub sections: Vec<String>,
}

impl Site {
    /// URL of a listing page, with exactly one `/` at the join
    pub fn listing_url(&self, catalog_path: &str) -> String {
        let base = self.base_url.trim_end_matches('/');
        if catalog_path.starts_with('/') {
            format!("{}{}", base, catalog_path)
        } else {
            format!("{}/{}", base, catalog_path)
        }
    }
}

/// Pressure gauge catalog at manotom.com
fn manotom() -> SiteConfig {
    let sections = [
        "/catalog/mekh/manometry-strelochnye-s-kanalom-peredachi-dannykh/",
        "/catalog/mekh/tochnye/tochnye/",
        "/catalog/mekh/tochnye/tekhnicheskie/",
        "/catalog/mekh/tochnye/ammiachnye/",
        "/catalog/mekh/tochnye/korrozionnostoykie/",
        "/catalog/mekh/tochnye/manometry-korrozionnostoykie-v-bezopasnom-korpuseе/",
        "/catalog/mekh/tochnye/manometry-s-zashchitoy-ot-peregruzki/",
        "/catalog/mekh/tochnye/vibroustoychivye/",
        "/catalog/mekh/tochnye/manometry-vibroustoychivye-korrozionnostoykie/",
        "/catalog/mekh/tochnye/electro-signal/",
        "/catalog/mekh/tochnye/electro-signal-vzr/",
        "/catalog/mekh/tochnye/zhd/",
        "/catalog/mekh/tochnye/sudovye/",
        "/catalog/mekh/tochnye/foodprom/",
        "/catalog/mekh/tochnye/dif/",
        "/catalog/mekh/tochnye/vacuum/",
    ];

    SiteConfig {
        name: "manotom".to_string(),
        base_url: Some("https://manotom.com/".to_string()),
        listing: ListingSpec {
            items: ".b-goods li".to_string(),
            links: vec!["a".to_string()],
            href_policy: HrefPolicy::AbsoluteOtherwise,
        },
        fields: vec![
            FieldSpec::text("категория", ".b-item-title h5"),
            FieldSpec::text("артикул", ".b-item-title h1"),
            FieldSpec::text("описание", ".b-text p"),
            FieldSpec::text("характеристики", ".b-text.b-text-table"),
            FieldSpec::source_url("url"),
            FieldSpec::flag("новинка", ".b-new", "да", "нет"),
        ],
        // "название" is never extracted here and contributes no identity values
        identity_fields: vec!["артикул".to_string(), "название".to_string()],
        sections: sections.iter().map(|s| s.to_string()).collect(),
    }
}

/// Generic 1C-Bitrix storefront layout. Needs `--base-url`.
fn bitrix() -> SiteConfig {
    SiteConfig {
        name: "bitrix".to_string(),
        base_url: None,
        listing: ListingSpec {
            items: ".catalog-section .product-item".to_string(),
            links: vec![
                "a.product-item-title".to_string(),
                ".product-item-title a".to_string(),
                "a.product-item-image-wrapper".to_string(),
                "a".to_string(),
            ],
            href_policy: HrefPolicy::JoinWithSlash,
        },
        fields: vec![
            FieldSpec::text("name", "h1"),
            FieldSpec::text("article", ".product-item-detail-article span"),
            FieldSpec::text("category", ".breadcrumb li:last-child"),
            FieldSpec::text("price", ".product-item-detail-price-current"),
            FieldSpec::pairs(
                "specifications",
                ".product-item-detail-properties dt",
                ".product-item-detail-properties dd",
            ),
            FieldSpec::source_url("url"),
            FieldSpec::flag("new", ".product-item-label-new", "yes", "no"),
        ],
        identity_fields: vec!["article".to_string(), "name".to_string()],
        sections: Vec::new(),
    }
}
