use crate::controllers::{ChatbotController, stream_reply};
use crate::services::AppServices;
use crate::types::{ChatMessage, Role};
use crate::views::shared::markdown_to_html;
use dioxus::events::Key;
use dioxus::prelude::*;

fn role_class(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        Role::Model => "model",
    }
}

#[component]
pub fn ChatView() -> Element {
    let services = use_context::<AppServices>();
    let mut controller = use_signal(|| ChatbotController::new(services.create_chat_session()));

    let mut send_message = move || {
        let Some(turn) = controller.write().begin_send() else {
            return;
        };
        spawn(async move {
            let result = stream_reply(turn, |text: &str| {
                controller.write().apply_partial(text);
            })
            .await;
            controller.write().complete_turn(result);
        });
    };

    let (messages, input, sending, error) = {
        let state = controller.read();
        (
            state.messages().to_vec(),
            state.input().to_string(),
            state.is_sending(),
            state.error().map(str::to_string),
        )
    };
    let send_disabled = sending || input.trim().is_empty();

    rsx! {
        div { class: "main-container",
            div { class: "chat-wrap",
                div { id: "chat-list", class: "chat-list",
                    for (i, msg) in messages.iter().enumerate() {
                        div { key: "{i}", class: format_args!("message-row {}", role_class(msg.role)),
                            if matches!(msg.role, Role::Model) { div { class: "avatar model", "AI" } }
                            MessageBubble { message: msg.clone() }
                            if matches!(msg.role, Role::User) { div { class: "avatar user", "You" } }
                        }
                    }
                }
            }

            div { class: "composer",
                if let Some(message) = error {
                    div { class: "error-banner", role: "alert",
                        span { "{message}" }
                        button {
                            class: "action-btn",
                            r#type: "button",
                            title: "Dismiss",
                            onclick: move |_| controller.write().dismiss_error(),
                            "×"
                        }
                    }
                }
                div { class: "composer-inner",
                    input {
                        r#type: "text",
                        placeholder: "Ask anything...",
                        value: "{input}",
                        disabled: sending,
                        autofocus: true,
                        oninput: move |ev| controller.write().set_input(ev.value()),
                        onkeydown: move |ev| {
                            if ev.key() == Key::Enter && !ev.modifiers().shift() {
                                ev.prevent_default();
                                send_message();
                            }
                        },
                    }
                    button {
                        class: "btn btn-primary",
                        r#type: "button",
                        disabled: send_disabled,
                        onclick: move |_| send_message(),
                        "Send"
                    }
                }
            }
        }
    }
}

#[component]
fn MessageBubble(message: ChatMessage) -> Element {
    let class = format!("bubble {}", role_class(message.role));
    let is_user = matches!(message.role, Role::User);
    let html = if is_user || message.text.is_empty() {
        String::new()
    } else {
        markdown_to_html(&message.text)
    };
    rsx! {
        div { class: "{class}",
            if is_user {
                p { class: "plain", "{message.text}" }
            } else if message.text.is_empty() {
                span { class: "shimmer-text", "..." }
            } else {
                div { class: "md", dangerous_inner_html: "{html}" }
            }
        }
    }
}
