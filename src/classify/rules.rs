//! Built-in rule tables for the six seeded retail categories.
//!
//! Keyword lists mix Spanish and English because the scraped stores do. The
//! thresholds and weights are empirically tuned against live listings; keep
//! them as-is unless re-tuning against labeled data.

use super::{CategoryRule, ComboKeyword, OverrideBranch, OverrideRule, RuleSet, ScorePattern};

pub const LAPTOPS: i64 = 1;
pub const GRAPHICS_CARDS: i64 = 2;
pub const HEADSETS: i64 = 3;
pub const KEYBOARDS: i64 = 4;
pub const MONITORS: i64 = 5;
pub const SSDS: i64 = 6;

fn strings(words: &[&str]) -> Vec<String> {
    words.iter().map(|w| w.to_string()).collect()
}

fn patterns(entries: &[(&str, i32)]) -> Vec<ScorePattern> {
    entries
        .iter()
        .map(|(p, w)| ScorePattern {
            pattern: p.to_string(),
            weight: *w,
        })
        .collect()
}

/// The full production rule set.
pub fn default_rules() -> RuleSet {
    RuleSet {
        global_excluded: global_excluded(),
        overrides: overrides(),
        categories: vec![
            laptops(),
            graphics_cards(),
            headsets(),
            keyboards(),
            monitors(),
            ssds(),
        ],
    }
}

/// Accessory/consumable terms that disqualify an item everywhere: cases,
/// cables, stands, cleaning kits and the like never belong to a product
/// category.
fn global_excluded() -> Vec<String> {
    strings(&[
        "funda", "mochila", "bolsa", "estuche", "protector", "carcasa", "soporte",
        "adaptador", "cable", "cargador", "batería", "bateria", "maletín", "maletin",
        "pegatina", "sticker", "skin", "vinilo", "accesorio", "accesorio para", "para laptop",
        "para portátil", "para portatil", "para monitor", "para teclado", "para auriculares",
        "para tarjeta", "limpiador", "almohadilla", "pad", "reposamuñecas", "reposamanos",
        "reposa muñecas", "reposa manos", "elevador", "base para", "base de", "forro",
        "cubierta", "sleeve", "bag", "case", "cover", "protector de", "protección para",
        "proteccion para", "accesorios para", "kit de limpieza", "cleaning kit",
        "extension", "extensión", "extensor", "conversor", "convertidor", "hub usb",
        "usb hub", "splitter", "divisor", "dock", "docking", "estación", "estacion",
        "refrigerador para", "cooler para", "ventilador para", "cooling pad", "cooling stand",
    ])
}

fn overrides() -> Vec<OverrideRule> {
    vec![
        // Mechanical keyboards get misfiled by generic keyword overlap more
        // than anything else; an explicit qualifier wins over all scoring.
        OverrideRule {
            trigger: strings(&["keyboard", "teclado"]),
            branches: vec![OverrideBranch {
                category_id: KEYBOARDS,
                keywords: strings(&[
                    "mechanical",
                    "mecánico",
                    "mecanico",
                    "gaming keyboard",
                ]),
            }],
        },
        // Retailer house-brand listings carry almost no usable nouns; route
        // them by whichever product word does appear.
        OverrideRule {
            trigger: strings(&["coolpc", "coolmod"]),
            branches: vec![
                OverrideBranch {
                    category_id: KEYBOARDS,
                    keywords: strings(&["keyboard", "teclado"]),
                },
                OverrideBranch {
                    category_id: LAPTOPS,
                    keywords: strings(&["laptop", "portátil", "portatil", "notebook"]),
                },
                OverrideBranch {
                    category_id: MONITORS,
                    keywords: strings(&[
                        "monitor", "pantalla", "display", "screen", "pulgadas", "inch",
                    ]),
                },
            ],
        },
    ]
}

fn laptops() -> CategoryRule {
    CategoryRule {
        category_id: LAPTOPS,
        excluded: strings(&[
            "teclado", "ratón", "mouse", "tarjeta gráfica", "tarjeta grafica", "gpu", "monitor",
            "auricular", "auriculares", "headset", "micrófono", "microfono", "disco duro externo",
            "procesador", "cpu", "tablet", "smartphone", "móvil", "movil", "cámara", "camara",
            "altavoz", "speaker", "impresora", "escáner", "scanner", "router", "switch",
            "keyboard", "headphone", "cascos", "webcam", "pantalla externa", "motherboard",
            "placa base", "fuente alimentación", "mando", "controller", "refrigeración",
            "ventilador", "cooling", "fan", "refrigeracion", "adaptador", "adapter", "hub",
            "docking", "station", "lector", "tarjeta", "card", "cartucho", "tinta", "soporte",
            "nvidia", "radeon", "rtx", "gtx", "rx", "geforce", "fuente", "psu", "kit", "liquid",
            "cooler", "funda portátil", "mochila portátil", "soporte portátil",
            "cargador portátil", "funda portatil", "mochila portatil", "soporte portatil",
            "cargador portatil", "laptop sleeve", "laptop bag", "laptop stand", "laptop cooler",
            "laptop cooling", "protector portátil", "protector portatil", "base refrigeradora",
            "base refrigerante", "alfombrilla", "mouse pad", "mousepad", "almohadilla",
            "reposamuñecas", "reposa muñecas", "coolpc gamer",
        ]),
        required: strings(&[
            "portátil", "portatil", "laptop", "notebook", "gaming laptop", "ordenador portatil",
            "ordenador portátil", "portátil gaming", "portatil gaming", "gaming portatil",
            "gaming portátil", "coolpc laptop", "pc portatil", "ordenador", "computer", "dell",
            "hp", "lenovo", "asus", "acer", "msi", "macbook", "surface", "thinkpad", "ideapad",
            "pavilion", "inspiron", "latitude", "precision",
        ]),
        score_patterns: patterns(&[
            (r"\blaptop\b", 2),
            (r"\bnotebook\b", 2),
            (r"\bportatil\b", 2),
            (r"\bportátil\b", 2),
            (r"\bordenador\s+port[aá]til\b", 2),
            (r"\bgaming\s+laptop\b", 2),
            (r"\bpc\b", 2),
            (r"\bdell\b", 2),
            (r"\bhp\b", 2),
            (r"\blenovo\b", 2),
            (r"\basus\b", 2),
            (r"\bacer\b", 2),
            (r"\bmsi\b", 2),
            (r"\bideapad\b", 2),
            (r"\bthinkpad\b", 2),
            (r"\binspiron\b", 2),
            (r"\blatitude\b", 2),
        ]),
        extra_keywords: vec![
            ("ram".into(), 1),
            ("ssd".into(), 1),
            ("intel".into(), 1),
            ("amd".into(), 1),
            ("ryzen".into(), 1),
            ("core i".into(), 1),
        ],
        combos: vec![],
        min_score: 2,
    }
}

fn graphics_cards() -> CategoryRule {
    CategoryRule {
        category_id: GRAPHICS_CARDS,
        excluded: strings(&[
            "portátil", "portatil", "laptop", "notebook", "teclado", "ratón", "mouse",
            "monitor", "auricular", "headset", "micrófono", "microfono", "disco duro",
            "ssd", "ram", "procesador", "cpu", "tablet", "smartphone", "móvil", "movil",
            "cámara", "camara", "altavoz", "speaker", "impresora", "escáner", "scanner",
            "router", "switch", "cable", "adaptador", "carcasa", "funda",
            "keyboard", "headphone", "auriculares", "cascos", "webcam", "mando", "controller",
            "placa base", "motherboard", "fuente alimentación", "power supply",
            "soporte", "base", "refrigeración líquida", "refrigeracion liquida",
            "refrigerador", "dock", "controlador", "hub", "usb", "patín", "patin", "silla",
            "chair", "gaming", "gamer", "juego", "play", "touchpad", "raton",
            "soporte para tarjeta", "soporte gpu", "gpu support", "graphics card holder",
            "bracket", "adaptador gpu", "gpu adapter", "riser", "extensor pcie", "pcie riser",
            "cable extensión", "cable extension", "cable alargador", "cable extensor",
        ]),
        required: strings(&[
            "tarjeta gráfica", "tarjeta grafica", "gpu", "geforce", "radeon", "rtx", "gtx",
            "rx", "nvidia", "amd", "graphics card", "gráfica", "grafica", "video card",
            "tarjeta de video", "vga", "pcie", "gddr", "ddr", "gddr5", "gddr6", "hbm", "cuda",
            "ti", "super",
        ]),
        score_patterns: patterns(&[
            (r"\brtx\s*\d{4}\b", 3),
            (r"\bgtx\s*\d{3,4}\b", 3),
            (r"\brx\s*\d{4}\b", 3),
            (r"\bradeon\b", 3),
            (r"\bgeforce\b", 3),
            (r"\bnvidia\b", 3),
            (r"\bgráfica\b", 3),
            (r"\bgrafica\b", 3),
            (r"\bgpu\b", 3),
            (r"\btarjeta\b", 3),
        ]),
        extra_keywords: vec![],
        combos: vec![],
        min_score: 3,
    }
}

fn headsets() -> CategoryRule {
    CategoryRule {
        category_id: HEADSETS,
        excluded: strings(&[
            "portátil", "portatil", "laptop", "notebook", "teclado", "ratón", "mouse",
            "tarjeta gráfica", "tarjeta grafica", "gpu", "monitor", "disco duro", "ssd",
            "ram", "procesador", "cpu", "tablet", "smartphone", "móvil", "movil",
            "cámara", "camara", "altavoz", "speaker", "impresora", "escáner", "scanner",
            "router", "switch", "keyboard", "webcam", "ventilador", "cooling",
            "refrigeración", "placa base", "motherboard", "fuente alimentación",
            "adapter", "cable", "hub", "docking", "station", "mando", "controller",
            "nvidia", "geforce", "rtx", "gtx", "radeon", "rx", "graphics card",
            "soporte auriculares", "headset stand", "headphone stand", "headphone hook",
            "colgador auriculares", "gancho auriculares", "almohadillas", "ear pads",
            "espuma", "foam", "repuesto", "replacement", "cable auriculares",
            "headphone cable", "cable para auriculares", "cable para headset",
            "adaptador jack", "jack adapter",
        ]),
        required: strings(&[
            "auricular", "auriculares", "headset", "headphone", "cascos", "earphone",
            "earbud", "gaming headset", "micrófono", "microfono", "surround", "sonido",
            "sound", "7.1", "5.1", "estéreo", "estereo", "stereo", "wireless", "bluetooth",
            "inalámbrico", "inalambrico", "on-ear", "over-ear", "in-ear", "noise cancelling",
            "cancelación de ruido",
        ]),
        score_patterns: patterns(&[
            (r"\bauricular\b", 2),
            (r"\bauriculares\b", 2),
            (r"\bcascos\b", 2),
            (r"\bheadset\b", 2),
            (r"\bheadphone\b", 2),
            (r"\bearphone\b", 2),
            (r"\bmic\b", 2),
            (r"\bmicrófono\b", 2),
            (r"\bmicrofono\b", 2),
            (r"\bstereo\b", 2),
            (r"\bestéreo\b", 2),
            (r"\bsonido\b", 2),
            (r"\bsound\b", 2),
            (r"\bwireless\b", 2),
            (r"\binalámbrico\b", 2),
            (r"\binalambrico\b", 2),
        ]),
        extra_keywords: vec![],
        combos: vec![],
        min_score: 2,
    }
}

fn keyboards() -> CategoryRule {
    CategoryRule {
        category_id: KEYBOARDS,
        excluded: strings(&[
            "portátil", "portatil", "laptop", "notebook",
            "tarjeta gráfica", "tarjeta grafica", "gpu", "monitor", "disco duro",
            "ssd", "ram", "procesador", "cpu", "tablet", "smartphone", "móvil", "movil",
            "cámara", "camara", "impresora", "escáner", "scanner", "router", "switch",
            "pantalla", "display", "webcam", "ventilador", "cooling", "refrigeración",
            "placa base", "motherboard", "fuente alimentación", "power supply",
            "graphic card", "graphic", "memoria", "memory", "card", "tarjeta", "nvidia",
            "amd", "geforce", "radeon", "rtx", "gtx", "rx", "fuente", "fan", "led strip",
            "tira led", "auricular", "auriculares", "headset", "headphone", "cascos",
            "earphone", "earbud", "reposamuñecas", "wrist rest", "reposa muñecas",
            "keycaps", "teclas", "switches", "funda teclado", "keyboard cover",
            "protector teclado", "keyboard protector", "almohadilla teclado",
            "keyboard pad", "soporte teclado", "keyboard stand", "extractor teclas",
            "keycap puller", "extractor keycaps", "keycap remover", "coolpc gamer",
        ]),
        required: strings(&[
            "teclado", "keyboard", "gaming keyboard", "mechanical keyboard", "mecánico",
            "mecanico", "mechanical", "switches", "rgb keyboard", "retroiluminado",
            "backlit", "cherry mx", "membrane", "membrana", "qwerty", "macro", "keycaps",
            "teclas", "keyboard layout", "tkl keyboard", "razer keyboard",
            "corsair keyboard", "logitech keyboard", "hyperx keyboard", "60%", "75%",
            "87%", "104 keys", "108 keys",
        ]),
        score_patterns: patterns(&[
            (r"\bteclado\b", 3),
            (r"\bkeyboard\b", 3),
            (r"\bmecánico\b", 3),
            (r"\bmecanico\b", 3),
            (r"\bmechanical\b", 3),
            (r"\bswitches\b", 3),
            (r"\brgb\b", 3),
            (r"\bteclas\b", 3),
            (r"\bkeycaps\b", 3),
            (r"\btkl\b", 3),
            (r"\b104\s*keys\b", 3),
            (r"\b108\s*keys\b", 3),
        ]),
        extra_keywords: vec![],
        combos: ["razer", "corsair", "logitech", "hyperx", "steelseries", "ducky"]
            .iter()
            .map(|brand| ComboKeyword {
                required: brand.to_string(),
                with_any: strings(&["keyboard", "teclado"]),
                weight: 4,
            })
            .collect(),
        min_score: 3,
    }
}

fn monitors() -> CategoryRule {
    CategoryRule {
        category_id: MONITORS,
        excluded: strings(&[
            "portátil", "portatil", "laptop", "notebook", "tarjeta gráfica",
            "tarjeta grafica", "gpu", "auricular", "headset", "micrófono", "microfono",
            "disco duro", "ssd", "ram", "procesador", "cpu", "tablet", "smartphone",
            "móvil", "movil", "cámara", "camara", "altavoz", "speaker", "impresora",
            "escáner", "scanner", "router", "switch", "headphone", "auriculares", "cascos",
            "teclado", "keyboard", "ventilador", "cooling", "refrigeración", "placa base",
            "motherboard", "fuente alimentación", "power supply", "graphic card", "graphic",
            "tarjeta", "psu", "cooler", "mechanical keyboard", "mechanical gaming keyboard",
            "soporte monitor", "monitor stand", "monitor arm", "brazo monitor",
            "monitor mount", "base monitor", "monitor riser", "elevador monitor",
            "vesa mount", "soporte vesa", "adaptador monitor", "monitor adapter",
            "protector pantalla", "screen protector", "filtro monitor", "monitor filter",
            "filtro luz azul", "blue light filter",
        ]),
        required: strings(&[
            "monitor", "pantalla", "display", "screen", "lcd", "led", "ips",
            "gaming monitor", "curved", "curvo", "panel", "freesync", "gsync", "g-sync",
            "hdmi", "displayport", "144hz", "165hz", "240hz", "120hz", "ultrawide",
            "ultraancho", "4k", "2k", "qhd", "pulgadas", "inch", "inches", "monitor coolpc",
            "monitor coolmod",
        ]),
        score_patterns: patterns(&[
            (r"\bmonitor\b", 2),
            (r"\bdisplay\b", 2),
            (r"\bpantalla\b", 2),
            (r"\bpanel\b", 2),
            (r"\bultrawide\b", 2),
            (r"\bcurved\b", 2),
            (r"\b\d{2,3}hz\b", 2),
            (r"\bips\b", 2),
            (r"\b4k\b", 2),
            (r"\b2k\b", 2),
            (r"\bqhd\b", 2),
            (r"\bhd\b", 2),
            (r"\bfhd\b", 2),
            (r#"\d+[\.,]?\d*\s*["'´]"#, 2),
            (r"\d+[\.,]?\d*\s*pulgadas\b", 2),
            (r"\binch\b", 2),
        ]),
        extra_keywords: vec![],
        combos: vec![],
        min_score: 2,
    }
}

fn ssds() -> CategoryRule {
    CategoryRule {
        category_id: SSDS,
        excluded: strings(&[
            "portátil", "portatil", "laptop", "notebook", "teclado", "ratón", "mouse",
            "tarjeta gráfica", "tarjeta grafica", "gpu", "monitor", "auricular", "headset",
            "micrófono", "microfono", "procesador", "cpu", "tablet", "smartphone", "móvil",
            "movil", "cámara", "camara", "altavoz", "speaker", "impresora", "escáner",
            "scanner", "router", "switch", "headphone", "auriculares", "cascos", "webcam",
            "ventilador", "cooling", "refrigeración", "placa base", "motherboard",
            "fuente alimentación", "power supply", "keyboard", "mando", "controller",
            "psu", "carcasa ssd", "ssd enclosure", "adaptador ssd", "ssd adapter",
            "caddy ssd", "conversor ssd", "ssd converter", "soporte ssd", "ssd bracket",
            "ssd mount", "cable sata", "cable nvme", "cable m.2", "extension ssd",
            "extensión ssd", "coolpc gamer",
        ]),
        required: strings(&[
            "ssd", "disco", "nvme", "m.2", "sata", "almacenamiento", "storage",
            "solid state", "estado sólido", "estado solido", "drive", "pcie", "tlc", "qlc",
            "mlc", "gen3", "gen4", "nand", "flash", "gb", "tb",
        ]),
        score_patterns: patterns(&[
            (r"\bssd\b", 2),
            (r"\bnvme\b", 2),
            (r"\bm\.2\b", 2),
            (r"\bestado\s+s[oó]lido\b", 2),
            (r"\bsolid\s+state\b", 2),
            (r"\b\d+\s*gb\b", 2),
            (r"\b\d+\s*tb\b", 2),
            (r"\bpcie\b", 2),
            (r"\bgen\d\b", 2),
            (r"\bsata\b", 2),
            (r"\bdisco\b", 2),
            (r"\bdrive\b", 2),
            (r"\balmacenamiento\b", 2),
            (r"\bstorage\b", 2),
        ]),
        extra_keywords: vec![],
        combos: vec![],
        min_score: 2,
    }
}
