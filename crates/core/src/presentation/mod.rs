//! Slide-deck controller for lecture-style presentations.
//!
//! The controller owns all navigation state (current slide and chapter and
//! the fades it started) and is driven by key events on the scene root. It
//! relies on a few node ids in the scene:
//!
//! - `slide_title` and `slide_text0..N` (required) receive the slide text,
//! - `headings` (optional) holds one `<chapter>_heading` node per chapter,
//! - `images` (optional) holds one image per chapter, id = chapter name,
//! - `logo` (optional) is hidden on the first slide.

use std::{cell::RefCell, path::Path, rc::Rc};

use serde::{Deserialize, Serialize};

use crate::{
    anim::{fade_to, Anim},
    events::HandlerId,
    AttrKey, Event, EventType, NodeId, Player, PlayerError, Propagation, Result,
};

const DIMMED_HEADING: f64 = 0.3;

fn default_text_lines() -> usize {
    8
}

fn default_transition_ms() -> u64 {
    300
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deck {
    pub chapters: Vec<Chapter>,
    /// Slide contents by slide number; slides past the end are blank.
    #[serde(default)]
    pub slides: Vec<Slide>,
    #[serde(default = "default_text_lines")]
    pub text_lines: usize,
    #[serde(default = "default_transition_ms")]
    pub transition_ms: u64,
}

impl Deck {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn num_slides(&self) -> usize {
        self.chapters.iter().map(|chapter| chapter.slides).sum()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chapter {
    pub name: String,
    pub slides: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Slide {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub lines: Vec<String>,
    /// Nodes faded in while this slide is shown.
    #[serde(default)]
    pub reveal: Vec<String>,
}

#[derive(Debug)]
pub struct Presentation {
    deck: Deck,
    chapter_starts: Vec<usize>,
    num_slides: usize,
    current_slide: Option<usize>,
    current_chapter: Option<usize>,
    title: NodeId,
    text_lines: Vec<NodeId>,
    fades: Vec<(NodeId, Anim)>,
    key_handler: Option<HandlerId>,
}

impl Presentation {
    /// Validates the scene against the deck, installs the key handler on the
    /// scene root and shows the first slide.
    pub fn attach(player: &mut Player, deck: Deck) -> Result<Rc<RefCell<Self>>> {
        let num_slides = deck.num_slides();
        if num_slides == 0 {
            return Err(PlayerError::msg("deck has no slides"));
        }
        let chapter_starts = deck
            .chapters
            .iter()
            .scan(0, |start, chapter| {
                let first = *start;
                *start += chapter.slides;
                Some(first)
            })
            .collect();
        let title = player.get_element_by_id("slide_title")?;
        let text_lines = (0..deck.text_lines)
            .map(|line| player.get_element_by_id(&format!("slide_text{line}")))
            .collect::<Result<Vec<_>>>()?;

        let presentation = Rc::new(RefCell::new(Self {
            deck,
            chapter_starts,
            num_slides,
            current_slide: None,
            current_chapter: None,
            title,
            text_lines,
            fades: Vec::new(),
            key_handler: None,
        }));

        let root = player.scene()?.root();
        let controller = presentation.clone();
        let handler = player.add_event_handler(root, EventType::KeyUp, move |player, event| {
            controller.borrow_mut().on_key(player, event)
        })?;
        presentation.borrow_mut().key_handler = Some(handler);
        presentation.borrow_mut().switch_to_slide(player, 0)?;
        tracing::info!(slides = num_slides, "presentation attached");
        Ok(presentation)
    }

    pub fn current_slide(&self) -> Option<usize> {
        self.current_slide
    }

    pub fn current_chapter(&self) -> Option<&str> {
        self.current_chapter
            .map(|chapter| self.deck.chapters[chapter].name.as_str())
    }

    pub fn num_slides(&self) -> usize {
        self.num_slides
    }

    fn chapter_of(&self, slide: usize) -> usize {
        self.chapter_starts
            .iter()
            .rposition(|start| *start <= slide)
            .unwrap_or(0)
    }

    fn on_key(&mut self, player: &mut Player, event: &Event) -> Result<Propagation> {
        let current = self.current_slide.unwrap_or(0) as i64;
        let target = match event.keystring() {
            Some("page down" | "right" | "space") => current + 1,
            Some("page up" | "left") => current - 1,
            Some("home") => 0,
            Some("end") => self.num_slides as i64 - 1,
            other => {
                tracing::debug!(key = other, "key ignored by presentation");
                return Ok(Propagation::Continue);
            }
        };
        self.switch_to_slide(player, target)?;
        Ok(Propagation::Stop)
    }

    /// Shows `slide`, clamped to the deck. Switching to the slide already
    /// shown does nothing.
    pub fn switch_to_slide(&mut self, player: &mut Player, slide: i64) -> Result<()> {
        let slide = slide.clamp(0, self.num_slides as i64 - 1) as usize;
        let last_slide = self.current_slide;
        if last_slide == Some(slide) {
            return Ok(());
        }
        self.fades.retain(|(_, anim)| !anim.is_done());

        if let Some(last) = last_slide {
            for id in self.slide(last).reveal {
                if let Ok(node) = player.get_element_by_id(&id) {
                    self.fade(player, node, 0.0)?;
                }
            }
        }

        let last_chapter = self.current_chapter;
        let chapter = self.chapter_of(slide);
        self.current_slide = Some(slide);
        self.current_chapter = Some(chapter);
        let chapter_name = self.deck.chapters[chapter].name.clone();
        tracing::info!(slide, chapter = %chapter_name, ?last_slide, "switching slide");

        if last_chapter != Some(chapter) {
            self.highlight_heading(player, &chapter_name)?;
        }

        let starts_chapter = slide == 0 || self.chapter_of(slide - 1) != chapter;
        let chapter_image = if starts_chapter {
            player.get_element_by_id(&chapter_name).ok()
        } else {
            None
        };
        if let Some(image) = chapter_image {
            self.fade(player, image, 1.0)?;
        }
        if let Ok(images) = player.get_element_by_id("images") {
            let children = player.scene()?.node(images)?.children().to_vec();
            for child in children {
                let opacity = player.scene()?.get_float(child, AttrKey::Opacity)?;
                let fading = self.fades.iter().any(|(faded, _)| *faded == child);
                if (opacity != 0.0 || fading) && Some(child) != chapter_image {
                    self.fade(player, child, 0.0)?;
                }
            }
        }

        if let Ok(logo) = player.get_element_by_id("logo") {
            if slide == 0 {
                self.cancel_fades(player, logo);
                player.set_attr(logo, AttrKey::Opacity, 0.0)?;
            } else if player.scene()?.get_float(logo, AttrKey::Opacity)? != 1.0 {
                self.fade(player, logo, 1.0)?;
            }
        }

        self.show_text(player, slide)?;

        for id in self.slide(slide).reveal {
            match player.get_element_by_id(&id) {
                Ok(node) => self.fade(player, node, 1.0)?,
                Err(err) => tracing::warn!(slide, error = %err, "cannot reveal node"),
            }
        }
        Ok(())
    }

    fn slide(&self, slide: usize) -> Slide {
        self.deck.slides.get(slide).cloned().unwrap_or_default()
    }

    fn highlight_heading(&mut self, player: &mut Player, chapter_name: &str) -> Result<()> {
        let Ok(headings) = player.get_element_by_id("headings") else {
            return Ok(());
        };
        let children = player.scene()?.node(headings)?.children().to_vec();
        for child in children {
            player.set_attr(child, AttrKey::Opacity, DIMMED_HEADING)?;
        }
        if let Ok(heading) = player.get_element_by_id(&format!("{chapter_name}_heading")) {
            player.set_attr(heading, AttrKey::Opacity, 1.0)?;
        }
        Ok(())
    }

    fn show_text(&self, player: &mut Player, slide: usize) -> Result<()> {
        let content = self.slide(slide);
        if content.lines.len() > self.text_lines.len() {
            tracing::warn!(
                slide,
                lines = content.lines.len(),
                available = self.text_lines.len(),
                "slide has more lines than text nodes"
            );
        }
        let scene = player.scene_mut()?;
        scene.set_string(self.title, AttrKey::Text, content.title.unwrap_or_default())?;
        for (index, node) in self.text_lines.iter().enumerate() {
            let line = content.lines.get(index).cloned().unwrap_or_default();
            scene.set_string(*node, AttrKey::Text, line)?;
        }
        Ok(())
    }

    /// Starts a fade on `node`, replacing any fade this controller is
    /// already running on it.
    fn fade(&mut self, player: &mut Player, node: NodeId, target: f64) -> Result<()> {
        self.cancel_fades(player, node);
        let anim = fade_to(player, node, self.deck.transition_ms, target)?;
        self.fades.push((node, anim));
        Ok(())
    }

    fn cancel_fades(&mut self, player: &mut Player, node: NodeId) {
        self.fades.retain(|(faded, anim)| {
            if *faded == node {
                anim.abort(player);
                false
            } else {
                true
            }
        });
    }

    /// Removes the key handler and aborts every running fade.
    pub fn teardown(&mut self, player: &mut Player) {
        if let Some(handler) = self.key_handler.take() {
            player.remove_event_handler(handler);
        }
        for (_, anim) in self.fades.drain(..) {
            anim.abort(player);
        }
        tracing::info!(slide = ?self.current_slide, "presentation torn down");
    }
}
