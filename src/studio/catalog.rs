use tracing::warn;

pub const FALLBACK_MODEL_LABEL: &str = "model";
pub const FALLBACK_POSE_LABEL: &str = "pose";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelOption {
    pub id: &'static str,
    pub label: &'static str,
    pub description: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoseOption {
    pub id: &'static str,
    pub label: &'static str,
}

const MODEL_TYPES: &[ModelOption] = &[
    ModelOption {
        id: "elegant-woman",
        label: "Zarif Kadın",
        description: "Sofistike ve vakur bir görünüm",
    },
    ModelOption {
        id: "modern-man",
        label: "Modern Erkek",
        description: "Keskin hatlı ve şık maskülen tarz",
    },
    ModelOption {
        id: "minimalist-neutral",
        label: "Minimalist Nötr",
        description: "Sadece kıyafete odaklanan temiz çekim",
    },
    ModelOption {
        id: "avant-garde",
        label: "Avangart Stil",
        description: "Yüksek moda ve sanatsal duruş",
    },
    ModelOption {
        id: "street-fashion",
        label: "Sokak Modası",
        description: "Genç, dinamik ve kentsel bir hava",
    },
    ModelOption {
        id: "commercial-bright",
        label: "Ticari Parlak",
        description: "E-ticaret siteleri için ideal aydınlık çekim",
    },
];

const POSE_STYLES: &[PoseOption] = &[
    PoseOption {
        id: "editorial-walking",
        label: "Yürüyüş (Editorial)",
    },
    PoseOption {
        id: "static-classic",
        label: "Klasik Ön Poz",
    },
    PoseOption {
        id: "sitting-sophisticated",
        label: "Zarif Oturuş",
    },
    PoseOption {
        id: "dynamic-side",
        label: "Dinamik Yan Poz",
    },
    PoseOption {
        id: "over-shoulder",
        label: "Omuz Üstü Bakış",
    },
    PoseOption {
        id: "hands-pockets",
        label: "Eller Cepte",
    },
    PoseOption {
        id: "detail-focus",
        label: "Detay Odaklı",
    },
    PoseOption {
        id: "candid-natural",
        label: "Doğal/Haberci Pozu",
    },
];

pub fn list_models() -> &'static [ModelOption] {
    MODEL_TYPES
}

pub fn list_poses() -> &'static [PoseOption] {
    POSE_STYLES
}

pub fn default_model_id() -> &'static str {
    MODEL_TYPES[0].id
}

pub fn default_pose_id() -> &'static str {
    POSE_STYLES[1].id
}

pub fn find_model(id: &str) -> Option<&'static ModelOption> {
    MODEL_TYPES.iter().find(|model| model.id == id)
}

pub fn find_pose(id: &str) -> Option<&'static PoseOption> {
    POSE_STYLES.iter().find(|pose| pose.id == id)
}

/// Unknown ids resolve to a generic label instead of failing; the prompt
/// still gets built.
pub fn resolve_model_label(id: &str) -> &'static str {
    match find_model(id) {
        Some(model) => model.label,
        None => {
            warn!("Unknown model id '{}'; using generic label", id);
            FALLBACK_MODEL_LABEL
        }
    }
}

pub fn resolve_pose_label(id: &str) -> &'static str {
    match find_pose(id) {
        Some(pose) => pose.label,
        None => {
            warn!("Unknown pose id '{}'; using generic label", id);
            FALLBACK_POSE_LABEL
        }
    }
}
