//! Metal/not-metal classification of crowd-sourced artist tags.

use crate::model::TagSet;

/// Default minimum weighted keyword score for a metal verdict.
pub const DEFAULT_METAL_SCORE_THRESHOLD: f32 = 1.5;
/// Default number of tolerated tags naming a clearly non-metal genre.
pub const DEFAULT_MAX_DISQUALIFYING_HITS: usize = 2;

/// Keyword weight at which an exact tag match is a definitive metal signal.
const DEFINITIVE_WEIGHT: f32 = 2.0;

/// Tags shorter than this only match keywords in the keyword-contains-tag
/// direction, so stray short tags ("a", "uk") cannot hit every entry.
const MIN_ABBREVIATION_CHARS: usize = 4;

const METAL_KEYWORDS: &[(&str, f32)] = &[
    ("metal", 1.0),
    ("heavy metal", 1.5),
    ("death metal", 2.0),
    ("brutal death metal", 2.0),
    ("technical death metal", 2.0),
    ("melodic death metal", 2.0),
    ("black metal", 2.0),
    ("war metal", 2.0),
    ("thrash", 1.5),
    ("speed metal", 1.5),
    ("power metal", 1.5),
    ("doom", 1.5),
    ("sludge", 1.5),
    ("stoner metal", 1.5),
    ("drone metal", 1.5),
    ("grindcore", 2.0),
    ("goregrind", 2.0),
    ("powerviolence", 1.5),
    ("deathcore", 1.5),
    ("metalcore", 1.5),
    ("mathcore", 1.5),
    ("djent", 1.5),
    ("post-metal", 1.5),
    ("progressive metal", 1.5),
    ("symphonic metal", 1.5),
    ("folk metal", 1.5),
    ("viking metal", 1.5),
    ("pagan metal", 1.5),
    ("gothic metal", 1.5),
    ("industrial metal", 1.5),
    ("avant-garde metal", 1.5),
    ("nwobhm", 1.5),
    ("crust", 1.0),
    ("nu metal", 1.0),
    ("glam metal", 1.0),
];

const DISQUALIFYING_KEYWORDS: &[&str] = &[
    "pop",
    "hip hop",
    "hip-hop",
    "trip hop",
    "trip-hop",
    "rap",
    "country",
    "classical",
    "jazz",
    "electronic",
    "edm",
    "house",
    "techno",
    "trance",
    "dubstep",
    "r&b",
    "rnb",
    "soul",
    "funk",
    "reggae",
    "disco",
    "indie",
    "singer-songwriter",
    "blues",
    "gospel",
    "latin",
    "schlager",
    "new age",
    "soundtrack",
];

/// Words that embed a disqualifying keyword without naming that genre
/// ("latin" in "platinum", "rap" in "rapture"). Masked before matching.
const EMBEDDED_FALSE_HITS: &[&str] = &[
    "platinum",
    "rapture",
    "scrap",
    "grape",
    "soulless",
    "discography",
    "entrance",
];

/// Classification verdict for one artist's tags.
#[derive(Debug, Clone, PartialEq)]
pub struct GenreVerdict {
    pub is_metal: bool,
    pub metal_score: f32,
    pub disqualifying_hits: usize,
    /// Whether a tag named a core metal subgenre exactly.
    pub definitive: bool,
    /// Tags that contributed to the metal score, in ranking order.
    pub matched_tags: Vec<String>,
}

/// Tunable thresholds for [`GenreClassifier`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassifierThresholds {
    pub metal_score: f32,
    pub max_disqualifying_hits: usize,
}

impl Default for ClassifierThresholds {
    fn default() -> Self {
        Self {
            metal_score: DEFAULT_METAL_SCORE_THRESHOLD,
            max_disqualifying_hits: DEFAULT_MAX_DISQUALIFYING_HITS,
        }
    }
}

/// Weighted-keyword metal classifier.
#[derive(Debug, Clone, Default)]
pub struct GenreClassifier {
    thresholds: ClassifierThresholds,
}

impl GenreClassifier {
    pub fn new(thresholds: ClassifierThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> ClassifierThresholds {
        self.thresholds
    }

    fn tag_weight(tag: &str) -> f32 {
        METAL_KEYWORDS
            .iter()
            .filter(|(keyword, _)| {
                tag.contains(keyword)
                    || (tag.chars().count() >= MIN_ABBREVIATION_CHARS && keyword.contains(tag))
            })
            .map(|(_, weight)| *weight)
            .sum()
    }

    fn is_definitive(tag: &str) -> bool {
        METAL_KEYWORDS
            .iter()
            .any(|(keyword, weight)| *weight >= DEFINITIVE_WEIGHT && tag == *keyword)
    }

    /// Substring match on the lowercased tag, so "synthpop" counts as pop.
    fn is_disqualifying(tag: &str) -> bool {
        let masked = EMBEDDED_FALSE_HITS
            .iter()
            .fold(tag.to_string(), |masked, word| masked.replace(word, " "));
        DISQUALIFYING_KEYWORDS
            .iter()
            .any(|keyword| masked.contains(keyword))
    }

    /// Scores the top-ranked tags and returns the verdict.
    ///
    /// Metal requires the score threshold and at most the tolerated number of
    /// disqualifying tags; a tag naming a core subgenre exactly ("death metal")
    /// overrides the disqualifying count. An empty tag set is never metal.
    pub fn classify(&self, tags: &TagSet) -> GenreVerdict {
        let mut metal_score = 0.0f32;
        let mut disqualifying_hits = 0usize;
        let mut matched_tags = Vec::new();
        let mut definitive = false;

        for tag in tags.iter() {
            let lowered = tag.trim().to_lowercase();
            if lowered.is_empty() {
                continue;
            }
            let weight = Self::tag_weight(&lowered);
            if weight > 0.0 {
                metal_score += weight;
                matched_tags.push(tag.clone());
                definitive |= Self::is_definitive(&lowered);
            }
            if Self::is_disqualifying(&lowered) {
                disqualifying_hits += 1;
            }
        }

        let is_metal = metal_score >= self.thresholds.metal_score
            && (definitive || disqualifying_hits <= self.thresholds.max_disqualifying_hits);
        GenreVerdict {
            is_metal,
            metal_score,
            disqualifying_hits,
            definitive,
            matched_tags,
        }
    }
}
