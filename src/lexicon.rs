//! Static vocabulary tables for candidate extraction.
//!
//! Single source of truth — the extractor is the only consumer, but the
//! tables live apart from the rule logic so additions don't touch code
//! paths. All entries are lowercase; lookups happen after normalization.

/// Common medications matched verbatim in OCR text. Mix of generic and
/// brand names; brand names are canonicalized via [`CORRECTIONS`].
pub const KNOWN_MEDICATIONS: &[&str] = &[
    "acetaminophen",
    "albuterol",
    "amlodipine",
    "amoxicillin",
    "aspirin",
    "atorvastatin",
    "azithromycin",
    "cephalexin",
    "cetirizine",
    "ciprofloxacin",
    "clopidogrel",
    "diazepam",
    "diclofenac",
    "doxycycline",
    "esomeprazole",
    "fluoxetine",
    "gabapentin",
    "hydrochlorothiazide",
    "ibuprofen",
    "levothyroxine",
    "lisinopril",
    "loratadine",
    "losartan",
    "metformin",
    "metoprolol",
    "naproxen",
    "omeprazole",
    "ondansetron",
    "pantoprazole",
    "prednisone",
    "sertraline",
    "simvastatin",
    "sumatriptan",
    "tramadol",
    "warfarin",
];

/// Misspelling and brand-name corrections applied to normalized candidates.
/// Left side: what OCR (or the label) produced; right side: canonical name
/// queried against the sources. Includes the classic OCR confusions
/// (rn→m, cl→d, l→i) observed on real labels.
pub const CORRECTIONS: &[(&str, &str)] = &[
    // Brand → generic
    ("tylenol", "acetaminophen"),
    ("panadol", "acetaminophen"),
    ("advil", "ibuprofen"),
    ("motrin", "ibuprofen"),
    ("aleve", "naproxen"),
    ("zyrtec", "cetirizine"),
    ("claritin", "loratadine"),
    ("prilosec", "omeprazole"),
    ("nexium", "esomeprazole"),
    ("zoloft", "sertraline"),
    ("prozac", "fluoxetine"),
    ("lipitor", "atorvastatin"),
    ("zocor", "simvastatin"),
    ("glucophage", "metformin"),
    ("valium", "diazepam"),
    ("coumadin", "warfarin"),
    // OCR confusions
    ("amoriedlin", "amoxicillin"),
    ("amoxicilin", "amoxicillin"),
    ("arnoxicillin", "amoxicillin"),
    ("ibuprofin", "ibuprofen"),
    ("lbuprofen", "ibuprofen"),
    ("acetarninophen", "acetaminophen"),
    ("rnetformin", "metformin"),
    ("metforrnin", "metformin"),
    ("orneprazole", "omeprazole"),
    ("lisinoprll", "lisinopril"),
    ("atorvastatln", "atorvastatin"),
    ("warfarln", "warfarin"),
];

/// Packaging, legal and instructional vocabulary that the capitalized-word
/// heuristic would otherwise promote to candidates.
pub const EXCLUDED_WORDS: &[&str] = &[
    "adults", "after", "avoid", "away", "before", "bottle", "capsule",
    "capsules", "caution", "childproof", "children", "contains", "daily",
    "directions", "doctor", "dosage", "dose", "drug", "each", "exactly",
    "expiry", "extra", "food", "from", "keep", "label", "liquid", "medicine",
    "morning", "night", "ounce", "package", "pharmacist", "pharmacy",
    "prescribed", "prescription", "reach", "refill", "shake", "storage",
    "store", "strength", "swallow", "tablet", "tablets", "take", "twice",
    "warning", "warnings", "water", "with", "without",
];

/// Canonicalize a normalized name via the correction table.
pub fn correct(normalized: &str) -> &str {
    CORRECTIONS
        .iter()
        .find(|(from, _)| *from == normalized)
        .map(|(_, to)| *to)
        .unwrap_or(normalized)
}

pub fn is_excluded_word(normalized: &str) -> bool {
    EXCLUDED_WORDS.contains(&normalized)
}
