use reqwest::Url;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};

use crate::controller::{DetailView, RecipeCard, ResultsBody, ResultsView};
use crate::recipe::Category;
use crate::theme::ThemePreference;

// Telegram rejects longer message texts.
const MESSAGE_LIMIT: usize = 4096;

static SPECIAL_CHARACTERS: [char; 19] = [
    '_', '*', '[', ']', '(', ')', '~', '`', '>', '#', '+', '-', '=', '|', '{', '}', '.', '!', '\\',
];

pub fn escape_markdown(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if SPECIAL_CHARACTERS.contains(&c) {
            escaped.push('\\');
        }
        escaped.push(c)
    }
    escaped
}

struct Glyphs {
    theme: &'static str,
    area: &'static str,
    category: &'static str,
    tip: &'static str,
}

fn glyphs(theme: ThemePreference) -> Glyphs {
    match theme {
        ThemePreference::Light => Glyphs {
            theme: "☀️",
            area: "🌍",
            category: "🍴",
            tip: "💡",
        },
        ThemePreference::Dark => Glyphs {
            theme: "🌙",
            area: "🌐",
            category: "🍽",
            tip: "🕯",
        },
    }
}

/// Button actions, carried in the callback data of inline keyboards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Details(String),
    Favorite(String),
    Category(String),
}

impl Action {
    pub fn encode(&self) -> String {
        match self {
            Action::Details(id) => format!("details:{}", id),
            Action::Favorite(id) => format!("fav:{}", id),
            Action::Category(name) => format!("cat:{}", name),
        }
    }

    pub fn parse(data: &str) -> Option<Action> {
        let (kind, value) = data.split_once(':')?;
        if value.is_empty() {
            return None;
        }
        match kind {
            "details" => Some(Action::Details(value.to_string())),
            "fav" => Some(Action::Favorite(value.to_string())),
            "cat" => Some(Action::Category(value.to_string())),
            _ => None,
        }
    }
}

pub fn results_header(view: &ResultsView) -> String {
    let title = format!("*{}*", escape_markdown(&view.title));
    match &view.body {
        ResultsBody::Cards(cards) if cards.len() == 1 => format!("{}\n1 recipe", title),
        ResultsBody::Cards(cards) => format!("{}\n{} recipes", title, cards.len()),
        ResultsBody::Empty(message) | ResultsBody::Error(message) => {
            format!("{}\n\n{}", title, escape_markdown(message))
        }
    }
}

pub fn card_caption(card: &RecipeCard, theme: ThemePreference) -> String {
    let glyphs = glyphs(theme);
    format!(
        "*{}*\n{} {}   {} {}",
        escape_markdown(&card.name),
        glyphs.area,
        escape_markdown(&card.area),
        glyphs.category,
        escape_markdown(&card.category)
    )
}

fn link_button(text: &str, link: &str) -> Option<InlineKeyboardButton> {
    match Url::parse(link) {
        Ok(url) => Some(InlineKeyboardButton::url(text.to_string(), url)),
        Err(e) => {
            log::warn!("Dropping link button for {:?}: {}", link, e);
            None
        }
    }
}

pub fn card_keyboard(card: &RecipeCard) -> InlineKeyboardMarkup {
    let mut row = vec![InlineKeyboardButton::callback(
        "View Details",
        Action::Details(card.id.clone()).encode(),
    )];
    row.extend(link_button("Original Recipe", &card.source_link));
    InlineKeyboardMarkup::new(vec![row])
}

pub fn detail_text(view: &DetailView, theme: ThemePreference) -> String {
    let glyphs = glyphs(theme);
    let mut text = format!(
        "*{}*\n\n{} _Chef's Tip: Pair with_ *{}*\\.\n\n*Ingredients*\n",
        escape_markdown(&view.name),
        glyphs.tip,
        escape_markdown(&view.pairing)
    );
    for line in &view.ingredients {
        text.push_str(&format!(
            "• *{}*: {}\n",
            escape_markdown(&line.name),
            escape_markdown(&line.measure)
        ));
    }
    text.push_str("\n*Instructions*\n");
    for paragraph in &view.instructions {
        let paragraph = format!("{}\n\n", escape_markdown(paragraph));
        if text.chars().count() + paragraph.chars().count() > MESSAGE_LIMIT - 8 {
            text.push_str("\\.\\.\\.");
            break;
        }
        text.push_str(&paragraph);
    }
    text.trim_end().to_string()
}

pub fn detail_keyboard(view: &DetailView) -> InlineKeyboardMarkup {
    favorite_keyboard(&view.id, view.is_favorite, &view.source_link)
}

/// Save/Remove button reflecting the current state, plus the source link.
pub fn favorite_keyboard(id: &str, is_favorite: bool, source_link: &str) -> InlineKeyboardMarkup {
    let label = if is_favorite { "💔 Remove" } else { "🤍 Save" };
    let mut row = vec![InlineKeyboardButton::callback(
        label,
        Action::Favorite(id.to_string()).encode(),
    )];
    row.extend(link_button("Original Source", source_link));
    InlineKeyboardMarkup::new(vec![row])
}

pub fn categories_text(categories: &[Category]) -> String {
    if categories.is_empty() {
        "No categories available\\.".to_string()
    } else {
        "*All Categories*".to_string()
    }
}

pub fn categories_keyboard(categories: &[Category]) -> InlineKeyboardMarkup {
    let rows = categories
        .chunks(3)
        .map(|chunk| {
            chunk
                .iter()
                .map(|category| {
                    InlineKeyboardButton::callback(
                        category.name.clone(),
                        Action::Category(category.name.clone()).encode(),
                    )
                })
                .collect()
        })
        .collect::<Vec<Vec<_>>>();
    InlineKeyboardMarkup::new(rows)
}

pub fn theme_text(theme: ThemePreference) -> String {
    format!("{} Theme: *{}*", glyphs(theme).theme, theme)
}

pub fn favorites_badge(count: usize) -> String {
    format!("❤️ Favorites: *{}*", count)
}

pub fn favorite_toggled(added: bool, count: usize) -> String {
    let action = if added {
        "Saved to favorites"
    } else {
        "Removed from favorites"
    };
    format!("{}\\. {}", action, favorites_badge(count))
}
