use serde::Serialize;

/// The two panels of the shell. Selection is pure view state: no flow is
/// touched by switching tabs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Tab {
    #[default]
    Text,
    Audio,
}

impl Tab {
    pub fn id(self) -> &'static str {
        match self {
            Tab::Text => "text",
            Tab::Audio => "audio",
        }
    }

    pub fn parse(id: &str) -> Option<Self> {
        match id.trim().to_ascii_lowercase().as_str() {
            "text" => Some(Tab::Text),
            "audio" => Some(Tab::Audio),
            _ => None,
        }
    }

    pub fn all() -> [Tab; 2] {
        [Tab::Text, Tab::Audio]
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TabView {
    pub id: &'static str,
    pub label: &'static str,
    pub active: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ShellView {
    pub tabs: Vec<TabView>,
}

pub fn shell_view(active: Tab) -> ShellView {
    let tabs = Tab::all()
        .into_iter()
        .map(|t| TabView {
            id: t.id(),
            label: match t {
                Tab::Text => "Text Translation",
                Tab::Audio => "Audio Translation",
            },
            active: t == active,
        })
        .collect();
    ShellView { tabs }
}

#[cfg(test)]
mod tests {
    use super::{shell_view, Tab};

    #[test]
    fn selecting_any_tab_activates_exactly_one_panel() {
        for tab in Tab::all() {
            let view = shell_view(tab);
            let active: Vec<_> = view.tabs.iter().filter(|t| t.active).collect();
            assert_eq!(active.len(), 1);
            assert_eq!(active[0].id, tab.id());
        }
    }

    #[test]
    fn parse_round_trips_ids_and_rejects_junk() {
        for tab in Tab::all() {
            assert_eq!(Tab::parse(tab.id()), Some(tab));
        }
        assert_eq!(Tab::parse(" AUDIO "), Some(Tab::Audio));
        assert_eq!(Tab::parse("settings"), None);
    }
}
