/// The fixed set of assistant modes offered in the sidebar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AppMode {
    #[default]
    General,
    Planner,
    Coder,
    Writer,
}

/// Icon shown next to a mode. Rendering is left to the front-end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeIcon {
    Chat,
    Project,
    Code,
    Write,
}

impl ModeIcon {
    /// Single-cell glyph used by terminal front-ends.
    pub fn glyph(&self) -> &'static str {
        match self {
            ModeIcon::Chat => "◎",
            ModeIcon::Project => "▤",
            ModeIcon::Code => "⌘",
            ModeIcon::Write => "✎",
        }
    }
}

/// Per-mode presentation and prompting settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModeConfig {
    pub icon: ModeIcon,
    pub system_instruction: &'static str,
    pub placeholder: &'static str,
}

const GENERAL: ModeConfig = ModeConfig {
    icon: ModeIcon::Chat,
    system_instruction: "You are a helpful and knowledgeable AI assistant. Answer the user's questions clearly and concisely.",
    placeholder: "Ask me anything...",
};

const PLANNER: ModeConfig = ModeConfig {
    icon: ModeIcon::Project,
    system_instruction: "You are a world-class project management assistant. Help the user break down tasks, set timelines, and organize their projects. Respond in a structured format, using markdown for lists, tables, and headings.",
    placeholder: "Describe a project to plan...",
};

const CODER: ModeConfig = ModeConfig {
    icon: ModeIcon::Code,
    system_instruction: "You are an expert programmer and code assistant. Provide clean, efficient, and well-explained code snippets. Use markdown code blocks with language identifiers.",
    placeholder: "What code do you need help with?",
};

const WRITER: ModeConfig = ModeConfig {
    icon: ModeIcon::Write,
    system_instruction: "You are a creative writing assistant. Help the user brainstorm ideas, write stories, poems, or any other creative text. Be imaginative and inspiring.",
    placeholder: "What story do you want to write?",
};

/// Look up the settings for a mode.
pub fn config_for(mode: AppMode) -> &'static ModeConfig {
    match mode {
        AppMode::General => &GENERAL,
        AppMode::Planner => &PLANNER,
        AppMode::Coder => &CODER,
        AppMode::Writer => &WRITER,
    }
}

impl AppMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppMode::General => "general",
            AppMode::Planner => "planner",
            AppMode::Coder => "coder",
            AppMode::Writer => "writer",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "general" => Some(AppMode::General),
            "planner" => Some(AppMode::Planner),
            "coder" => Some(AppMode::Coder),
            "writer" => Some(AppMode::Writer),
            _ => None,
        }
    }

    pub fn all() -> Vec<AppMode> {
        vec![AppMode::General, AppMode::Planner, AppMode::Coder, AppMode::Writer]
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            AppMode::General => "General",
            AppMode::Planner => "Planner",
            AppMode::Coder => "Coder",
            AppMode::Writer => "Writer",
        }
    }

    pub fn config(&self) -> &'static ModeConfig {
        config_for(*self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_mode_has_instruction_and_placeholder() {
        for mode in AppMode::all() {
            let config = config_for(mode);
            assert!(!config.system_instruction.trim().is_empty());
            assert!(!config.placeholder.is_empty());
        }
    }

    #[test]
    fn icons_are_distinct_per_mode() {
        let icons: Vec<ModeIcon> = AppMode::all().iter().map(|m| m.config().icon).collect();
        assert_eq!(
            icons,
            vec![ModeIcon::Chat, ModeIcon::Project, ModeIcon::Code, ModeIcon::Write]
        );
    }

    #[test]
    fn from_str_is_case_insensitive() {
        assert_eq!(AppMode::from_str("Coder"), Some(AppMode::Coder));
        assert_eq!(AppMode::from_str(" WRITER "), Some(AppMode::Writer));
        assert_eq!(AppMode::from_str("poet"), None);
    }

    #[test]
    fn as_str_round_trips() {
        for mode in AppMode::all() {
            assert_eq!(AppMode::from_str(mode.as_str()), Some(mode));
        }
    }

    #[test]
    fn coder_placeholder() {
        assert_eq!(
            config_for(AppMode::Coder).placeholder,
            "What code do you need help with?"
        );
    }
}
