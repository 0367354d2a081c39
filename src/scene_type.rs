use strum_macros::{Display, EnumString};

/// Scene intensity classes, decided by keyword match before every turn.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum SceneType {
    #[default]
    Normal,
    Romantic,
    Intimate,
    Explicit,
    Rest,
}

impl SceneType {
    /// Allowed pleasure-delta envelope for the scene type.
    pub fn pleasure_range(self) -> (i64, i64) {
        match self {
            SceneType::Normal => (0, 5),
            SceneType::Romantic => (5, 20),
            SceneType::Intimate => (15, 40),
            SceneType::Explicit => (30, 60),
            SceneType::Rest => (-20, -5),
        }
    }

    /// Flat pleasure decay applied when the planner supplied no delta.
    pub fn decay_amount(self) -> i64 {
        match self {
            SceneType::Normal => 5,
            SceneType::Rest => 15,
            // Romantic scenes hold steady; intimate/explicit scenes are
            // expected to carry explicit deltas instead.
            SceneType::Romantic | SceneType::Intimate | SceneType::Explicit => 0,
        }
    }
}

const ROMANTIC_KEYWORDS: [&str; 14] = [
    "拥抱", "亲吻", "牵手", "依偎", "抱住", "亲了一下", "贴近", "搂住", "靠在怀里", "抱着",
    "吻了", "亲嘴", "轻吻", "深吻",
];

const INTIMATE_KEYWORDS: [&str; 16] = [
    "抚摸身体", "爱抚", "触碰敏感", "揉捏", "舔舐", "吮吸", "摸着胸", "胸部", "乳房", "臀部",
    "大腿内侧", "敏感部位", "私处", "脱衣", "解开", "褪下",
];

const EXPLICIT_KEYWORDS: [&str; 15] = [
    "插入", "抽送", "进入体内", "深入", "顶弄", "撞击", "射精", "高潮", "抽插", "交合", "做爱",
    "性交", "进入了", "顶到", "射在",
];

const REST_KEYWORDS: [&str; 9] = [
    "休息一下", "睡觉", "躺下休息", "放松一下", "恢复体力", "睡眠", "小憩", "歇息", "闭眼休息",
];

fn keywords_for(scene_type: SceneType) -> &'static [&'static str] {
    match scene_type {
        SceneType::Romantic => &ROMANTIC_KEYWORDS,
        SceneType::Intimate => &INTIMATE_KEYWORDS,
        SceneType::Explicit => &EXPLICIT_KEYWORDS,
        SceneType::Rest => &REST_KEYWORDS,
        SceneType::Normal => &[],
    }
}

/// Classifies the turn by scanning the user message against the keyword sets
/// in priority order (explicit > intimate > romantic > rest, first match
/// wins). With no match, the previous scene text is scanned as a continuation
/// heuristic; an explicit match found there is demoted to intimate since last
/// turn's peak says nothing about this turn's contribution.
pub fn classify(user_message: &str, last_scene: &str) -> SceneType {
    let message = user_message.to_lowercase();
    for scene_type in [
        SceneType::Explicit,
        SceneType::Intimate,
        SceneType::Romantic,
        SceneType::Rest,
    ] {
        if keywords_for(scene_type).iter().any(|k| message.contains(k)) {
            return scene_type;
        }
    }

    if !last_scene.is_empty() {
        let scene = last_scene.to_lowercase();
        for scene_type in [SceneType::Explicit, SceneType::Intimate] {
            if keywords_for(scene_type).iter().any(|k| scene.contains(k)) {
                return if scene_type == SceneType::Explicit {
                    SceneType::Intimate
                } else {
                    scene_type
                };
            }
        }
    }

    SceneType::Normal
}
