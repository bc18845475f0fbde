use kk_core::models::{FolderDescriptor, PortRole};

/// One selectable row in a picker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PickerItem {
    pub label: String,
    /// Dimmed text after the label.
    pub detail: Option<String>,
}

/// State of the modal list picker used for interactive prompts.
#[derive(Debug, Clone)]
pub struct PickerState {
    pub title: String,
    pub prompt: String,
    pub items: Vec<PickerItem>,
    pub selected: usize,
}

impl PickerState {
    pub fn new(title: impl Into<String>, prompt: impl Into<String>, items: Vec<PickerItem>) -> Self {
        Self {
            title: title.into(),
            prompt: prompt.into(),
            items,
            selected: 0,
        }
    }

    /// Candidates for one port role; the first is the allocator's suggestion.
    pub fn for_ports(role: PortRole, candidates: &[u16]) -> Self {
        let items = candidates
            .iter()
            .enumerate()
            .map(|(i, port)| PickerItem {
                label: port.to_string(),
                detail: (i == 0).then(|| "suggested".to_string()),
            })
            .collect();
        Self::new(
            format!(" {role} port "),
            format!("Host port for {role}:"),
            items,
        )
    }

    pub fn for_folders(folders: &[FolderDescriptor]) -> Self {
        let items = folders
            .iter()
            .map(|folder| PickerItem {
                label: folder.name.clone(),
                detail: Some(folder.id.clone()),
            })
            .collect();
        Self::new(
            " Keeper folder ",
            "Shared folder for the cluster secret store:",
            items,
        )
    }

    pub fn select_next(&mut self) {
        if !self.items.is_empty() {
            self.selected = (self.selected + 1) % self.items.len();
        }
    }

    pub fn select_prev(&mut self) {
        if !self.items.is_empty() {
            if self.selected == 0 {
                self.selected = self.items.len() - 1;
            } else {
                self.selected -= 1;
            }
        }
    }

    pub fn select_first(&mut self) {
        self.selected = 0;
    }

    pub fn select_last(&mut self) {
        self.selected = self.items.len().saturating_sub(1);
    }

    /// Jump to `index` if it exists.
    pub fn select(&mut self, index: usize) -> bool {
        if index < self.items.len() {
            self.selected = index;
            true
        } else {
            false
        }
    }
}
