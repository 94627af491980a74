use dotenv::dotenv;
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use teloxide::types::{ChatAction, InputFile, MessageId, ParseMode};
use teloxide::{prelude::*, utils::command::BotCommands};

mod api;
mod config;
mod controller;
mod db;
mod favorites;
mod recipe;
mod render;
mod theme;

use api::{CocktailDbClient, MealDbClient, PairingSource, RecipeCatalog};
use config::Config;
use controller::{Controller, DetailError, FavoriteToggle, Outcome, RecipeCard, ResultsBody};
use db::{KeyValueStore, SqliteStore};
use favorites::{FavoritesStore, FAV_KEY};
use render::Action;
use theme::{ThemePreference, ThemeStore, THEME_KEY};

type HandlerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

#[derive(BotCommands, Clone)]
#[command(
    rename_rule = "lowercase",
    description = "These commands are supported:"
)]
enum Command {
    #[command(description = "Show your theme and favorites, then the home results.")]
    Start,
    #[command(description = "Display this text.")]
    Help,
    #[command(description = "Go back to the home results.")]
    Home,
    #[command(description = "Search recipes by name.")]
    Search(String),
    #[command(description = "List recipes of a category.")]
    Category(String),
    #[command(description = "Pick a category.")]
    Categories,
    #[command(description = "Show your favorite recipes.")]
    Favorites,
    #[command(description = "Show the details of a recipe by id.")]
    Details(String),
    #[command(description = "Switch between light and dark theme.")]
    Theme,
}

/// Shared collaborators plus one controller per chat.
struct App {
    config: Config,
    catalog: Arc<dyn RecipeCatalog>,
    pairing: Arc<dyn PairingSource>,
    kv: Arc<dyn KeyValueStore>,
    controllers: Mutex<HashMap<ChatId, Arc<Controller>>>,
}

impl App {
    fn new(
        config: Config,
        catalog: Arc<dyn RecipeCatalog>,
        pairing: Arc<dyn PairingSource>,
        kv: Arc<dyn KeyValueStore>,
    ) -> Self {
        Self {
            config,
            catalog,
            pairing,
            kv,
            controllers: Mutex::new(HashMap::new()),
        }
    }

    fn controller(&self, chat: ChatId) -> Arc<Controller> {
        let mut controllers = self.controllers.lock().unwrap_or_else(|e| e.into_inner());
        controllers
            .entry(chat)
            .or_insert_with(|| {
                log::debug!("Creating controller for chat {}", chat.0);
                Arc::new(Controller::new(
                    self.catalog.clone(),
                    self.pairing.clone(),
                    FavoritesStore::new(self.kv.clone(), format!("{}:{}", FAV_KEY, chat.0)),
                    ThemeStore::new(self.kv.clone(), format!("{}:{}", THEME_KEY, chat.0)),
                    self.config.home_query.clone(),
                ))
            })
            .clone()
    }
}

#[tokio::main]
async fn main() {
    // Load all env variables from .env file.
    dotenv().ok();
    if std::env::var_os("RUST_LOG").is_none() {
        std::env::set_var("RUST_LOG", "info");
    }
    pretty_env_logger::init();
    log::info!("Starting bot...");

    let config = Config::from_env();

    log::info!("Opening store at {}", config.db_path);
    let store = match SqliteStore::open(&config.db_path) {
        Ok(store) => store,
        Err(e) => panic!("Failed to open store {} with error {}", config.db_path, e),
    };

    let client = reqwest::Client::new();
    let app = Arc::new(App::new(
        config.clone(),
        Arc::new(MealDbClient::new(client.clone(), config.meal_api.clone())),
        Arc::new(CocktailDbClient::new(client, config.drink_api.clone())),
        Arc::new(store),
    ));

    let bot = Bot::from_env();
    let handler = dptree::entry()
        .branch(
            Update::filter_message()
                .filter_command::<Command>()
                .endpoint(answer),
        )
        .branch(
            Update::filter_message()
                .filter_map(|msg: Message| {
                    msg.text()
                        .map(str::trim)
                        .filter(|text| !text.is_empty() && !text.starts_with('/'))
                        .map(str::to_owned)
                })
                .endpoint(search_text),
        )
        .branch(Update::filter_callback_query().endpoint(on_callback));

    // Updates run concurrently so a newer request can supersede one in flight.
    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![app])
        .distribution_function(|_| None::<Infallible>)
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;
}

async fn answer(bot: Bot, app: Arc<App>, msg: Message, cmd: Command) -> HandlerResult {
    let chat = msg.chat.id;
    let controller = app.controller(chat);
    match cmd {
        Command::Start => {
            let text = format!(
                "{}\n{}",
                render::theme_text(controller.theme()),
                render::favorites_badge(controller.favorites_count())
            );
            send_markdown(&bot, chat, text).await?;
            show_loading(&bot, chat).await;
            let outcome = controller.home().await;
            send_outcome(&bot, chat, &controller, outcome, app.config.card_delay).await?;
        }
        Command::Help => {
            bot.send_message(chat, Command::descriptions().to_string())
                .await?;
        }
        Command::Home => {
            show_loading(&bot, chat).await;
            let outcome = controller.home().await;
            send_outcome(&bot, chat, &controller, outcome, app.config.card_delay).await?;
        }
        Command::Search(query) => {
            let query = query.trim();
            if query.is_empty() {
                bot.send_message(chat, "Usage: /search <recipe name>").await?;
                return Ok(());
            }
            run_search(&bot, &app, chat, query).await?;
        }
        Command::Category(category) => {
            let category = category.trim();
            if category.is_empty() {
                bot.send_message(chat, "Usage: /category <name>, or pick one with /categories")
                    .await?;
                return Ok(());
            }
            run_filter(&bot, &app, chat, category).await?;
        }
        Command::Categories => {
            let categories = controller.categories().await;
            bot.send_message(chat, render::categories_text(&categories))
                .parse_mode(ParseMode::MarkdownV2)
                .reply_markup(render::categories_keyboard(&categories))
                .await?;
        }
        Command::Favorites => {
            let outcome = controller.show_favorites();
            send_outcome(&bot, chat, &controller, outcome, Duration::ZERO).await?;
        }
        Command::Details(id) => {
            let id = id.trim();
            if id.is_empty() {
                bot.send_message(chat, "Usage: /details <recipe id>").await?;
                return Ok(());
            }
            send_details(&bot, &controller, chat, id).await?;
        }
        Command::Theme => {
            let theme = match controller.toggle_theme() {
                Ok(theme) => theme,
                Err(e) => {
                    log::error!("Failed to save theme for chat {}: {}", chat.0, e);
                    bot.send_message(chat, "Could not save your theme.").await?;
                    return Ok(());
                }
            };
            send_markdown(&bot, chat, render::theme_text(theme)).await?;
        }
    };
    Ok(())
}

async fn search_text(bot: Bot, app: Arc<App>, msg: Message, text: String) -> HandlerResult {
    run_search(&bot, &app, msg.chat.id, &text).await
}

async fn on_callback(bot: Bot, app: Arc<App>, q: CallbackQuery) -> HandlerResult {
    let action = q.data.as_deref().and_then(Action::parse);
    let chat = q.message.as_ref().map(|message| message.chat().id);
    let (action, chat) = match (action, chat) {
        (Some(action), Some(chat)) => (action, chat),
        _ => {
            log::warn!("Ignoring callback {:?}", q.data);
            bot.answer_callback_query(q.id.clone()).await?;
            return Ok(());
        }
    };
    let controller = app.controller(chat);

    match action {
        Action::Details(id) => {
            bot.answer_callback_query(q.id.clone()).await?;
            send_details(&bot, &controller, chat, &id).await?;
        }
        Action::Category(category) => {
            bot.answer_callback_query(q.id.clone()).await?;
            run_filter(&bot, &app, chat, &category).await?;
        }
        Action::Favorite(id) => match controller.toggle_favorite(&id).await {
            Ok(toggle) => {
                let notice = if toggle.is_favorite { "Saved" } else { "Removed" };
                bot.answer_callback_query(q.id.clone()).text(notice).await?;
                if let Some(message) = &q.message {
                    if let Err(e) = refresh_favorite_button(&bot, chat, message.id(), &toggle).await {
                        log::warn!("Could not redraw buttons for {}: {}", toggle.id, e);
                    }
                }
                let text =
                    render::favorite_toggled(toggle.is_favorite, controller.favorites_count());
                send_markdown(&bot, chat, text).await?;
            }
            Err(e) => {
                log::error!("Failed to toggle favorite {} for chat {}: {}", id, chat.0, e);
                bot.answer_callback_query(q.id.clone())
                    .text("Could not update favorites")
                    .await?;
            }
        },
    };
    Ok(())
}

async fn run_search(bot: &Bot, app: &App, chat: ChatId, query: &str) -> HandlerResult {
    let controller = app.controller(chat);
    show_loading(bot, chat).await;
    let outcome = controller.search(query).await;
    send_outcome(bot, chat, &controller, outcome, app.config.card_delay).await
}

async fn run_filter(bot: &Bot, app: &App, chat: ChatId, category: &str) -> HandlerResult {
    let controller = app.controller(chat);
    show_loading(bot, chat).await;
    let outcome = controller.filter(category).await;
    send_outcome(bot, chat, &controller, outcome, app.config.card_delay).await
}

async fn show_loading(bot: &Bot, chat: ChatId) {
    if let Err(e) = bot.send_chat_action(chat, ChatAction::Typing).await {
        log::debug!("Could not show typing in chat {}: {}", chat.0, e);
    }
}

async fn send_markdown(bot: &Bot, chat: ChatId, text: String) -> HandlerResult {
    bot.send_message(chat, text)
        .parse_mode(ParseMode::MarkdownV2)
        .await?;
    Ok(())
}

/// Sends the header and then the cards in order, stopping as soon as a newer
/// request takes over the chat.
async fn send_outcome(
    bot: &Bot,
    chat: ChatId,
    controller: &Controller,
    outcome: Outcome,
    delay: Duration,
) -> HandlerResult {
    let view = match outcome {
        Outcome::Current(view) => view,
        Outcome::Superseded => return Ok(()),
    };
    log::debug!(
        "Chat {} is {:?} at request {}",
        chat.0,
        controller.view_state(),
        controller.generation()
    );
    send_markdown(bot, chat, render::results_header(&view)).await?;

    let cards = match &view.body {
        ResultsBody::Cards(cards) => cards,
        _ => return Ok(()),
    };
    let theme = controller.theme();
    for (index, card) in cards.iter().enumerate() {
        if index > 0 && !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if !controller.is_current(view.generation) {
            log::debug!("Request {} superseded after {} cards", view.generation, index);
            break;
        }
        send_card(bot, chat, card, theme).await?;
    }
    Ok(())
}

/// Sends a card as a photo, or as plain text when there is no usable
/// thumbnail or Telegram refuses to fetch it.
async fn send_card(
    bot: &Bot,
    chat: ChatId,
    card: &RecipeCard,
    theme: ThemePreference,
) -> HandlerResult {
    let caption = render::card_caption(card, theme);
    let keyboard = render::card_keyboard(card);
    if let Ok(url) = reqwest::Url::parse(&card.thumbnail) {
        match bot
            .send_photo(chat, InputFile::url(url))
            .caption(caption.clone())
            .parse_mode(ParseMode::MarkdownV2)
            .reply_markup(keyboard.clone())
            .await
        {
            Ok(_) => return Ok(()),
            Err(e) => log::warn!("Photo of {} rejected, sending text card: {}", card.id, e),
        }
    }
    bot.send_message(chat, caption)
        .parse_mode(ParseMode::MarkdownV2)
        .reply_markup(keyboard)
        .await?;
    Ok(())
}

async fn refresh_favorite_button(
    bot: &Bot,
    chat: ChatId,
    message_id: MessageId,
    toggle: &FavoriteToggle,
) -> HandlerResult {
    bot.edit_message_reply_markup(chat, message_id)
        .reply_markup(render::favorite_keyboard(
            &toggle.id,
            toggle.is_favorite,
            &toggle.source_link,
        ))
        .await?;
    Ok(())
}

async fn send_details(bot: &Bot, controller: &Controller, chat: ChatId, id: &str) -> HandlerResult {
    show_loading(bot, chat).await;
    let view = match controller.open_details(id).await {
        Ok(view) => view,
        Err(DetailError::NotFound(_)) => {
            bot.send_message(chat, "Recipe not found.").await?;
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };
    if let Ok(url) = reqwest::Url::parse(&view.thumbnail) {
        if let Err(e) = bot.send_photo(chat, InputFile::url(url)).await {
            log::warn!("Photo of {} rejected: {}", view.id, e);
        }
    }
    bot.send_message(chat, render::detail_text(&view, controller.theme()))
        .parse_mode(ParseMode::MarkdownV2)
        .reply_markup(render::detail_keyboard(&view))
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::tests::{menu, FakeCatalog, FakePairing};
    use crate::db::MemoryStore;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, method, path_regex};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn app() -> App {
        App::new(
            Config::default(),
            Arc::new(FakeCatalog {
                meals: menu(),
                ..FakeCatalog::default()
            }),
            Arc::new(FakePairing(None)),
            Arc::new(MemoryStore::default()),
        )
    }

    #[test]
    fn controllers_are_reused_per_chat() {
        let app = app();
        let first = app.controller(ChatId(1));
        assert!(Arc::ptr_eq(&first, &app.controller(ChatId(1))));
        assert!(!Arc::ptr_eq(&first, &app.controller(ChatId(2))));
    }

    #[tokio::test]
    async fn chats_keep_separate_favorites_and_theme() {
        let app = app();
        let alice = app.controller(ChatId(1));
        let bob = app.controller(ChatId(2));

        assert!(alice.toggle_favorite("52772").await.unwrap().is_favorite);
        alice.toggle_theme().unwrap();

        assert_eq!(alice.favorites_count(), 1);
        assert_eq!(bob.favorites_count(), 0);
        assert_eq!(alice.theme(), ThemePreference::Dark);
        assert_eq!(bob.theme(), ThemePreference::Light);
    }

    #[tokio::test]
    async fn home_searches_the_configured_query() {
        let app = app();
        match app.controller(ChatId(1)).home().await {
            Outcome::Current(view) => assert_eq!(view.title, "Results for \"Chicken\""),
            Outcome::Superseded => panic!("request was not superseded"),
        }
    }

    async fn telegram() -> (MockServer, Bot) {
        let server = MockServer::start().await;
        let url = reqwest::Url::parse(&server.uri()).unwrap();
        let bot = Bot::new("123:TEST").set_api_url(url);
        Mock::given(method("POST"))
            .and(path_regex(r"(?i)/sendChatAction$"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true, "result": true})))
            .mount(&server)
            .await;
        (server, bot)
    }

    fn sent_message() -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "result": {
                "message_id": 1,
                "date": 0,
                "chat": {"id": 1, "type": "private", "first_name": "Test"},
                "text": "ok"
            }
        }))
    }

    fn rejected_photo() -> ResponseTemplate {
        ResponseTemplate::new(400).set_body_json(json!({
            "ok": false,
            "error_code": 400,
            "description": "Bad Request: wrong file identifier/HTTP URL specified"
        }))
    }

    #[tokio::test]
    async fn rejected_photos_fall_back_to_text_cards() {
        let (server, bot) = telegram().await;
        Mock::given(method("POST"))
            .and(path_regex(r"(?i)/sendPhoto$"))
            .respond_with(rejected_photo())
            .expect(3)
            .mount(&server)
            .await;
        // Header plus one text card per recipe.
        Mock::given(method("POST"))
            .and(path_regex(r"(?i)/sendMessage$"))
            .respond_with(sent_message())
            .expect(4)
            .mount(&server)
            .await;

        let controller = app().controller(ChatId(1));
        let outcome = controller.search("").await;
        send_outcome(&bot, ChatId(1), &controller, outcome, Duration::ZERO)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn details_are_sent_even_when_the_photo_is_rejected() {
        let (server, bot) = telegram().await;
        Mock::given(method("POST"))
            .and(path_regex(r"(?i)/sendPhoto$"))
            .respond_with(rejected_photo())
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path_regex(r"(?i)/sendMessage$"))
            .and(body_string_contains("Ingredients"))
            .respond_with(sent_message())
            .expect(1)
            .mount(&server)
            .await;

        let controller = app().controller(ChatId(1));
        send_details(&bot, &controller, ChatId(1), "52772").await.unwrap();
    }

    #[tokio::test]
    async fn favorite_button_is_redrawn_after_toggle() {
        let (server, bot) = telegram().await;
        Mock::given(method("POST"))
            .and(path_regex(r"(?i)/editMessageReplyMarkup$"))
            .and(body_string_contains("Remove"))
            .respond_with(sent_message())
            .expect(1)
            .mount(&server)
            .await;

        let controller = app().controller(ChatId(1));
        controller.open_details("52772").await.unwrap();
        let toggle = controller.toggle_favorite("52772").await.unwrap();
        refresh_favorite_button(&bot, ChatId(1), MessageId(7), &toggle)
            .await
            .unwrap();
    }
}
