use std::collections::VecDeque;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::StoreError;
use crate::protocol::field_model::AutofillAction;
use crate::session::menu::{AutofillMenu, MenuAnchor, MenuViewModel, SavePrompt};

#[derive(Debug, Clone, PartialEq)]
pub enum MenuEvent {
    Icon { element_id: String, action: AutofillAction },
    Menu { element_id: String, model: MenuViewModel },
    DismissMenu,
    Dismiss,
    Prompt(SavePrompt),
    Alert(StoreError),
}

#[derive(Debug)]
struct MenuState {
    events: Vec<MenuEvent>,
    answers: VecDeque<bool>,
    default_answer: bool,
    icon: Option<String>,
    menu: Option<MenuViewModel>,
}

/// `AutofillMenu` that records every call and answers save prompts from a
/// queue, falling back to a fixed answer.
#[derive(Debug)]
pub struct RecordingMenu {
    inner: Mutex<MenuState>,
}

impl RecordingMenu {
    pub fn new(accept_prompts: bool) -> Self {
        RecordingMenu {
            inner: Mutex::new(MenuState {
                events: Vec::new(),
                answers: VecDeque::new(),
                default_answer: accept_prompts,
                icon: None,
                menu: None,
            }),
        }
    }

    pub fn queue_answer(&self, accept: bool) {
        self.inner.lock().answers.push_back(accept);
    }

    pub fn events(&self) -> Vec<MenuEvent> {
        self.inner.lock().events.clone()
    }

    pub fn prompts(&self) -> Vec<SavePrompt> {
        self.inner
            .lock()
            .events
            .iter()
            .filter_map(|e| match e {
                MenuEvent::Prompt(p) => Some(p.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn alerts(&self) -> Vec<StoreError> {
        self.inner
            .lock()
            .events
            .iter()
            .filter_map(|e| match e {
                MenuEvent::Alert(err) => Some(err.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn menus_shown(&self) -> usize {
        self.inner
            .lock()
            .events
            .iter()
            .filter(|e| matches!(e, MenuEvent::Menu { .. }))
            .count()
    }

    /// Field whose icon is currently drawn.
    pub fn icon_field(&self) -> Option<String> {
        self.inner.lock().icon.clone()
    }

    pub fn visible_menu(&self) -> Option<MenuViewModel> {
        self.inner.lock().menu.clone()
    }

    pub fn clear(&self) {
        self.inner.lock().events.clear();
    }
}

#[async_trait]
impl AutofillMenu for RecordingMenu {
    async fn show_icon(&self, anchor: &MenuAnchor, action: AutofillAction) {
        let mut state = self.inner.lock();
        state.icon = Some(anchor.element_id.clone());
        state.events.push(MenuEvent::Icon {
            element_id: anchor.element_id.clone(),
            action,
        });
    }

    async fn show_menu(&self, anchor: &MenuAnchor, model: MenuViewModel) {
        let mut state = self.inner.lock();
        state.menu = Some(model.clone());
        state.events.push(MenuEvent::Menu {
            element_id: anchor.element_id.clone(),
            model,
        });
    }

    async fn dismiss_menu(&self) {
        let mut state = self.inner.lock();
        state.menu = None;
        state.events.push(MenuEvent::DismissMenu);
    }

    async fn dismiss(&self) {
        let mut state = self.inner.lock();
        state.menu = None;
        state.icon = None;
        state.events.push(MenuEvent::Dismiss);
    }

    async fn confirm_save(&self, prompt: &SavePrompt) -> bool {
        let mut state = self.inner.lock();
        state.events.push(MenuEvent::Prompt(prompt.clone()));
        let fallback = state.default_answer;
        state.answers.pop_front().unwrap_or(fallback)
    }

    async fn show_alert(&self, error: &StoreError) {
        self.inner.lock().events.push(MenuEvent::Alert(error.clone()));
    }
}
