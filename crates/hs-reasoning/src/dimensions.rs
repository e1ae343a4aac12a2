/// Dimension registry: the closed catalog of critical product dimensions.
///
/// A dimension is a semantic axis of product identity (material, species, processing
/// level, ...). Each entry carries:
/// - trigger patterns: when the dimension is relevant to a description
/// - coverage patterns: when free text already answers it
/// - a question template and a fallback option table keyed by description keywords
/// - chapter ranges scoping where it applies, and whether it is mandatory there
///
/// The catalog is data. Patterns are compiled once into the process-wide registry and the
/// engine never branches on individual dimension names.
use std::sync::LazyLock;

use regex::Regex;

use crate::keywords::contains_phrase;

/// Static description of one dimension, compiled into a `CriticalDimension`.
struct DimensionSpec {
    name: &'static str,
    display_name: &'static str,
    category: &'static str,
    priority: u8,
    triggers: &'static [&'static str],
    coverage: &'static [&'static str],
    question_template: &'static str,
    chapter_ranges: Option<&'static [(u8, u8)]>,
    mandatory: bool,
    option_sets: &'static [OptionSet],
    generic_options: &'static [&'static str],
}

/// Fallback options offered when the description mentions one of `keywords`.
#[derive(Debug)]
pub struct OptionSet {
    pub keywords: &'static [&'static str],
    pub options: &'static [&'static str],
}

const FOOD_TRIGGERS: &[&str] = &[
    r"\b(rice|coffee|tea|wheat|maize|corn|barley|oats|fish|shrimps?|prawns?|meat|beef|pork|mutton|poultry|chicken|fruits?|vegetables?|beans?|nuts?|spices?|pepper|cashews?|almonds?|grapes?|mangoe?s?|apples?)\b",
];

const GARMENT_TRIGGERS: &[&str] = &[
    r"\b(shirts?|t-shirts?|blouses?|dress(es)?|trousers?|jackets?|garments?|apparel|clothing|sweaters?|jerseys?)\b",
];

const CATALOG: &[DimensionSpec] = &[
    DimensionSpec {
        name: "species_variety",
        display_name: "Species / Variety",
        category: "agricultural",
        priority: 1,
        triggers: FOOD_TRIGGERS,
        coverage: &[
            r"\b(basmati|jasmine|arborio|glutinous|arabica|robusta|liberica|green tea|black tea|oolong|durum|salmon|tuna|cod|bovine|swine|ovine|cavendish|alphonso|black pepper|white pepper)\b",
        ],
        question_template: "What species or variety is the {product}?",
        chapter_ranges: Some(&[(1, 24)]),
        mandatory: true,
        option_sets: &[
            OptionSet {
                keywords: &["rice"],
                options: &["Basmati", "Jasmine", "Other long grain", "Medium or short grain"],
            },
            OptionSet {
                keywords: &["coffee"],
                options: &["Arabica", "Robusta", "Blend"],
            },
            OptionSet {
                keywords: &["tea"],
                options: &["Green", "Black", "Oolong"],
            },
            OptionSet {
                keywords: &["pepper"],
                options: &["Black pepper", "White pepper", "Long pepper"],
            },
        ],
        generic_options: &["Single named species", "Mixed species", "Not sure"],
    },
    DimensionSpec {
        name: "form_state",
        display_name: "Form / State",
        category: "agricultural",
        priority: 2,
        triggers: FOOD_TRIGGERS,
        coverage: &[
            r"\b(fresh|chilled|frozen|dried|dehydrated|whole|ground|crushed|powder(ed)?|paddy|husked|broken|flour|fillets?|liquid|paste|beans|leaf|leaves|sliced|diced|canned|in the husk|cherry|parchment)\b",
        ],
        question_template: "In what form or state is the {product}?",
        chapter_ranges: Some(&[(1, 24)]),
        mandatory: true,
        option_sets: &[
            OptionSet {
                keywords: &["rice"],
                options: &[
                    "Paddy (in the husk)",
                    "Husked (brown)",
                    "Semi-milled or wholly milled",
                    "Broken",
                ],
            },
            OptionSet {
                keywords: &["coffee"],
                options: &["Whole beans", "Ground", "Instant / soluble"],
            },
            OptionSet {
                keywords: &["tea"],
                options: &["Loose leaf", "Powder", "Tea bags"],
            },
            OptionSet {
                keywords: &["fish", "meat", "beef", "pork", "chicken", "shrimp", "prawn"],
                options: &["Fresh or chilled", "Frozen", "Dried, salted or smoked"],
            },
        ],
        generic_options: &["Fresh", "Frozen", "Dried or processed"],
    },
    DimensionSpec {
        name: "processing_level",
        display_name: "Processing Level",
        category: "agricultural",
        priority: 2,
        triggers: FOOD_TRIGGERS,
        coverage: &[
            r"\b(raw|unprocessed|roasted|unroasted|milled|semi-milled|parboiled|cooked|processed|instant|soluble|fermented|smoked|salted|polished|decaffeinated|blanched|refined|crude)\b",
        ],
        question_template: "What processing has the {product} undergone?",
        chapter_ranges: Some(&[(1, 24)]),
        mandatory: true,
        option_sets: &[
            OptionSet {
                keywords: &["rice"],
                options: &["Raw (not parboiled)", "Parboiled", "Cooked or prepared"],
            },
            OptionSet {
                keywords: &["coffee"],
                options: &["Green (not roasted)", "Roasted", "Decaffeinated"],
            },
            OptionSet {
                keywords: &["tea"],
                options: &["Unfermented", "Partly fermented", "Fully fermented"],
            },
        ],
        generic_options: &["Raw or unprocessed", "Partially processed", "Fully processed"],
    },
    DimensionSpec {
        name: "material",
        display_name: "Material",
        category: "manufactured",
        priority: 1,
        triggers: &[
            r"\b(shirts?|t-shirts?|blouses?|dress(es)?|trousers?|jackets?|garments?|apparel|clothing|fabrics?|bags?|handbags?|shoes?|footwear|furniture|chairs?|tables?|containers?|bottles?|pipes?|tubes?|toys?|boxes|utensils?|cookware)\b",
        ],
        coverage: &[
            r"\b(cotton|polyester|nylon|silk|wool(len)?|linen|leather|plastics?|steel|iron|alumin(i)?um|copper|brass|wood(en)?|bamboo|glass|ceramic|porcelain|rubber|synthetic|man-made|paper|cardboard)\b",
        ],
        question_template: "What material is the {product} made of?",
        chapter_ranges: None,
        mandatory: true,
        option_sets: &[
            OptionSet {
                keywords: &[
                    "shirt", "shirts", "t-shirt", "dress", "blouse", "trousers", "jacket",
                    "garment", "clothing", "apparel",
                ],
                options: &["Cotton", "Polyester", "Silk", "Wool", "Synthetic blend"],
            },
            OptionSet {
                keywords: &["furniture", "chair", "chairs", "table", "tables"],
                options: &["Wood", "Metal", "Plastic", "Bamboo or rattan"],
            },
            OptionSet {
                keywords: &["bag", "bags", "handbag", "handbags"],
                options: &["Leather", "Textile", "Plastic"],
            },
            OptionSet {
                keywords: &["shoe", "shoes", "footwear"],
                options: &["Leather", "Rubber or plastic", "Textile"],
            },
            OptionSet {
                keywords: &["container", "containers", "bottle", "bottles", "box", "boxes"],
                options: &["Plastic", "Glass", "Metal"],
            },
        ],
        generic_options: &["Metal", "Plastic", "Other material"],
    },
    DimensionSpec {
        name: "garment_construction",
        display_name: "Knitted or Woven",
        category: "textile",
        priority: 2,
        triggers: GARMENT_TRIGGERS,
        coverage: &[r"\b(knit(ted)?|crochet(ed)?|woven|non-woven|jersey|denim)\b"],
        question_template: "Is the {product} knitted (or crocheted) or woven?",
        chapter_ranges: Some(&[(61, 63)]),
        mandatory: true,
        option_sets: &[],
        generic_options: &["Knitted or crocheted", "Woven", "Not sure"],
    },
    DimensionSpec {
        name: "gender_age",
        display_name: "Gender / Age Group",
        category: "textile",
        priority: 3,
        triggers: GARMENT_TRIGGERS,
        coverage: &[
            r"\b(men'?s|women'?s|male|female|boys'?|girls'?|ladies|gents|infants?|bab(y|ies)|children'?s|kids|unisex)\b",
        ],
        question_template: "Who is the {product} made for?",
        chapter_ranges: Some(&[(61, 62)]),
        mandatory: true,
        option_sets: &[],
        generic_options: &["Men or boys", "Women or girls", "Babies"],
    },
    DimensionSpec {
        name: "end_use",
        display_name: "End Use / Function",
        category: "industrial",
        priority: 2,
        triggers: &[
            r"\b(parts?|components?|accessor(y|ies)|pads?|linings?|filters?|pumps?|valves?|bearings?|gears?|modules?|sensors?|devices?|equipment|machines?|machinery)\b",
        ],
        coverage: &[
            r"\b(for (cars?|vehicles?|motor ?cycles?|trucks?|aircraft|ships?|tractors?)|automotive|vehicles?|industrial|household|domestic|medical|agricultural|marine|aviation)\b",
        ],
        question_template: "What is the {product} used for?",
        chapter_ranges: Some(&[(68, 70), (84, 90)]),
        mandatory: true,
        option_sets: &[OptionSet {
            keywords: &["pad", "pads", "lining", "linings", "brake", "brakes"],
            options: &["Motor vehicles", "Industrial machinery", "Other"],
        }],
        generic_options: &["Industrial use", "Household use", "Vehicle use"],
    },
    DimensionSpec {
        name: "power_source",
        display_name: "Power Source",
        category: "industrial",
        priority: 3,
        triggers: &[
            r"\b(machines?|machinery|tools?|drills?|saws?|appliances?|mixers?|fans?|pumps?|motors?)\b",
        ],
        coverage: &[
            r"\b(electric(al)?|battery|cordless|manual|hand[- ]operated|diesel|petrol|gasoline|pneumatic|hydraulic|solar)\b",
        ],
        question_template: "How is the {product} powered?",
        chapter_ranges: Some(&[(82, 85)]),
        mandatory: true,
        option_sets: &[],
        generic_options: &["Electric", "Manual", "Engine or other power"],
    },
    DimensionSpec {
        name: "composition",
        display_name: "Fibre Composition",
        category: "textile",
        priority: 3,
        triggers: &[r"\b(fabrics?|yarns?|blend(ed)?|garments?|shirts?|t-shirts?)\b"],
        coverage: &[r"\d+\s?%", r"\b(100 percent|pure|blend of)\b"],
        question_template: "What is the fibre composition of the {product}?",
        chapter_ranges: Some(&[(50, 63)]),
        mandatory: false,
        option_sets: &[],
        generic_options: &[
            "100% single fibre",
            "Blend, mostly natural fibre",
            "Blend, mostly synthetic fibre",
        ],
    },
    DimensionSpec {
        name: "grade_quality",
        display_name: "Grade / Quality",
        category: "general",
        priority: 4,
        triggers: &[r"\b(coffee|tea|rice|cotton|steel|wool)\b"],
        coverage: &[
            r"\b(grade\s?[a-c1-3]|[a-c] grade|premium|standard|plantation|aa|pb|triage|superior|first quality)\b",
        ],
        question_template: "What grade or quality is the {product}?",
        chapter_ranges: None,
        mandatory: false,
        option_sets: &[OptionSet {
            keywords: &["coffee"],
            options: &["Grade A or plantation", "Grade B", "Grade C or triage"],
        }],
        generic_options: &["Premium", "Standard", "Not graded"],
    },
    DimensionSpec {
        name: "packaging",
        display_name: "Packaging",
        category: "general",
        priority: 5,
        triggers: FOOD_TRIGGERS,
        coverage: &[
            r"\b(bulk|retail|packets?|packed|sachets?|tins?|canned|bottled|jars?|bags? of)\b",
            r"\b\d+\s?(kg|g|gm|ml|l)\b",
        ],
        question_template: "How is the {product} packed?",
        chapter_ranges: None,
        mandatory: false,
        option_sets: &[],
        generic_options: &["Bulk", "Retail packs", "Not sure"],
    },
];

/// A compiled catalog entry.
#[derive(Debug)]
pub struct CriticalDimension {
    pub name: &'static str,
    pub display_name: &'static str,
    pub category: &'static str,
    /// 1 (ask first) to 5 (ask last)
    pub priority: u8,
    pub trigger_patterns: Vec<Regex>,
    pub coverage_patterns: Vec<Regex>,
    pub question_template: &'static str,
    /// Inclusive chapter ranges; `None` applies everywhere.
    pub chapter_ranges: Option<&'static [(u8, u8)]>,
    pub mandatory: bool,
    pub option_sets: &'static [OptionSet],
    pub generic_options: &'static [&'static str],
}

impl CriticalDimension {
    fn compile(spec: &DimensionSpec) -> Self {
        Self {
            name: spec.name,
            display_name: spec.display_name,
            category: spec.category,
            priority: spec.priority,
            trigger_patterns: compile_patterns(spec.triggers),
            coverage_patterns: compile_patterns(spec.coverage),
            question_template: spec.question_template,
            chapter_ranges: spec.chapter_ranges,
            mandatory: spec.mandatory,
            option_sets: spec.option_sets,
            generic_options: spec.generic_options,
        }
    }

    pub fn is_triggered_by(&self, text: &str) -> bool {
        self.trigger_patterns.iter().any(|re| re.is_match(text))
    }

    pub fn is_covered_by(&self, text: &str) -> bool {
        self.coverage_patterns.iter().any(|re| re.is_match(text))
    }

    /// Byte range of the earliest coverage match in `text`.
    pub fn coverage_match(&self, text: &str) -> Option<(usize, usize)> {
        self.coverage_patterns
            .iter()
            .filter_map(|re| re.find(text))
            .map(|m| (m.start(), m.end()))
            .min()
    }

    /// Whether any of `chapters` falls in this dimension's ranges.
    pub fn applies_to(&self, chapters: &[u8]) -> bool {
        match self.chapter_ranges {
            None => true,
            Some(ranges) => chapters
                .iter()
                .any(|c| ranges.iter().any(|(lo, hi)| lo <= c && c <= hi)),
        }
    }

    pub fn question_text(&self, product: &str) -> String {
        let product = product.trim();
        let product = if product.is_empty() { "product" } else { product };
        self.question_template.replace("{product}", product)
    }

    /// Options for a fallback question: the first option set whose keyword occurs in the
    /// description, else the generic options.
    pub fn options_for(&self, description: &str) -> &'static [&'static str] {
        self.option_sets
            .iter()
            .find(|set| set.keywords.iter().any(|k| contains_phrase(description, k)))
            .map(|set| set.options)
            .unwrap_or(self.generic_options)
    }

    /// The dimension name written with spaces ("species variety").
    pub fn spoken_name(&self) -> String {
        self.name.replace('_', " ")
    }
}

fn compile_patterns(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| Regex::new(&format!("(?i){p}")).expect("valid regex"))
        .collect()
}

pub struct DimensionRegistry {
    dimensions: Vec<CriticalDimension>,
}

static REGISTRY: LazyLock<DimensionRegistry> = LazyLock::new(|| DimensionRegistry {
    dimensions: CATALOG.iter().map(CriticalDimension::compile).collect(),
});

impl DimensionRegistry {
    /// The process-wide catalog.
    pub fn global() -> &'static DimensionRegistry {
        &REGISTRY
    }

    pub fn get(&self, name: &str) -> Option<&CriticalDimension> {
        self.dimensions.iter().find(|d| d.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CriticalDimension> {
        self.dimensions.iter()
    }

    pub fn len(&self) -> usize {
        self.dimensions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dimensions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dim(name: &str) -> &'static CriticalDimension {
        DimensionRegistry::global().get(name).unwrap()
    }

    #[test]
    fn test_catalog_compiles_and_names_are_unique() {
        let registry = DimensionRegistry::global();
        assert_eq!(registry.len(), CATALOG.len());
        let mut names: Vec<&str> = registry.iter().map(|d| d.name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), registry.len());
        assert!(registry.iter().all(|d| (1..=5).contains(&d.priority)));
    }

    #[test]
    fn test_rice_triggers_but_does_not_cover_agricultural_dimensions() {
        for name in ["species_variety", "form_state", "processing_level"] {
            let d = dim(name);
            assert!(d.is_triggered_by("rice"), "{name} should trigger on rice");
            assert!(!d.is_covered_by("rice"), "{name} should not be covered by rice");
            assert!(d.mandatory);
        }
    }

    #[test]
    fn test_coverage_patterns() {
        assert!(dim("species_variety").is_covered_by("Basmati rice"));
        assert!(dim("processing_level").is_covered_by("parboiled rice"));
        assert!(dim("material").is_covered_by("100% COTTON shirt"));
        assert!(dim("end_use").is_covered_by("brake pads for cars"));
        assert!(!dim("material").is_covered_by("men's shirt"));
    }

    #[test]
    fn test_chapter_ranges() {
        let species = dim("species_variety");
        assert!(species.applies_to(&[10]));
        assert!(!species.applies_to(&[87]));
        assert!(dim("material").applies_to(&[]));
        assert!(dim("end_use").applies_to(&[68, 99]));
    }

    #[test]
    fn test_options_for_is_keyword_driven() {
        let material = dim("material");
        assert_eq!(
            material.options_for("cotton-look shirt for men"),
            &["Cotton", "Polyester", "Silk", "Wool", "Synthetic blend"]
        );
        assert_eq!(material.options_for("widget"), &["Metal", "Plastic", "Other material"]);
    }

    #[test]
    fn test_question_text_substitutes_product() {
        assert_eq!(
            dim("material").question_text("shirt"),
            "What material is the shirt made of?"
        );
        assert_eq!(
            dim("material").question_text("  "),
            "What material is the product made of?"
        );
    }
}
