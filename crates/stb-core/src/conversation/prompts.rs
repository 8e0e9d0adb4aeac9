//! Client-facing dialogue texts (Telegram HTML).

use crate::{
    domain::{Category, TicketId},
    formatting::escape_html,
    messaging::types::{Keyboard, Reply},
};

pub const YES: &str = "Yes";
pub const NO: &str = "No";
pub const DONE: &str = "Done";
pub const FINISH: &str = "/finish";

pub fn yes_no() -> Keyboard {
    Keyboard::single_row([YES, NO])
}

pub fn category_keyboard() -> Keyboard {
    Keyboard::one_per_row(Category::ALL.iter().map(|c| c.menu_label()))
}

pub fn category_menu() -> Reply {
    Reply::text(
        "👋 Welcome to support!\n\nPlease choose what your request is about:",
    )
    .with_keyboard(category_keyboard())
}

pub fn category_retry() -> Reply {
    Reply::text("Please choose one of the categories using the buttons below.")
        .with_keyboard(category_keyboard())
}

pub fn ticket_opened(ticket: TicketId, category: Category) -> String {
    format!(
        "📝 Ticket <b>#{ticket}</b> created ({}).",
        escape_html(category.subject())
    )
}

pub fn ask_order_reference() -> &'static str {
    "Please send your order number or transaction reference."
}

pub const CURRENCIES: [&str; 5] = [
    "Bitcoin (BTC)",
    "Ethereum (ETH)",
    "USDT (TRC20)",
    "USDT (ERC20)",
    "Other",
];

pub fn ask_send_address() -> Reply {
    Reply::text("Thank you. Now send the <b>address</b> the payment was sent from.")
}

pub fn ask_currency() -> Reply {
    Reply::text("Which <b>currency</b> did you pay with? Pick one or type its name.")
        .with_keyboard(Keyboard::one_per_row(CURRENCIES))
}

pub fn ask_amount() -> Reply {
    Reply::text("How much did you send? For example <i>100</i> or <i>0.05</i>.")
        .with_keyboard(Keyboard::Remove)
}

pub fn payment_continue(ticket: TicketId) -> Reply {
    Reply::text(format!(
        "Thank you. Send any further details, screenshots or files, they will be added to ticket <b>#{ticket}</b>.\nSend /finish when you are done."
    ))
    .with_keyboard(Keyboard::single_row([FINISH]))
}

pub fn payment_added(ticket: TicketId) -> Reply {
    Reply::text(format!(
        "✉️ Added to ticket <b>#{ticket}</b>. Send more or /finish."
    ))
    .with_keyboard(Keyboard::single_row([FINISH]))
}

pub fn ask_has_video() -> Reply {
    Reply::text("Do you have a video of the problem?").with_keyboard(yes_no())
}

pub fn ask_video() -> Reply {
    Reply::text("Please send the video.").with_keyboard(Keyboard::Remove)
}

pub fn ask_has_photos() -> Reply {
    Reply::text("Do you have photos of the problem?").with_keyboard(yes_no())
}

pub fn ask_photos() -> Reply {
    Reply::text(format!(
        "Please send the photos. Press <b>{DONE}</b> when you have sent them all."
    ))
    .with_keyboard(Keyboard::single_row([DONE]))
}

pub fn photo_received(count: u32) -> Reply {
    Reply::text(format!(
        "📎 Attachment {count} received. Send more or press <b>{DONE}</b>."
    ))
    .with_keyboard(Keyboard::single_row([DONE]))
}

pub fn ask_description() -> Reply {
    Reply::text("Please describe the problem in a few words.").with_keyboard(Keyboard::Remove)
}

pub fn ask_question() -> &'static str {
    "Please type your question."
}

pub fn question_attachment_added() -> Reply {
    Reply::text("📎 Attachment added. Please also type your question.")
}

pub fn ask_about() -> &'static str {
    "Tell us a little about yourself."
}

pub fn ask_position() -> Reply {
    Reply::text("Which position are you interested in?")
}

pub fn ask_experience() -> Reply {
    Reply::text("Please describe your relevant experience.")
}

pub fn text_expected() -> &'static str {
    "Please answer with a text message."
}

pub fn dispute_summary(ticket: TicketId, order: &str, video: bool, photos: u32) -> Reply {
    Reply::text(format!(
        "✅ Your dispute was submitted as ticket <b>#{ticket}</b>.\n\nOrder: {}\nVideo: {}\nPhotos: {photos}\n\nOur team will reply here. You can keep writing to add details.",
        escape_html(order),
        if video { "yes" } else { "no" },
    ))
    .with_keyboard(Keyboard::Remove)
}

pub fn question_submitted(ticket: TicketId) -> Reply {
    Reply::text(format!(
        "✅ Your question was submitted as ticket <b>#{ticket}</b>. Our team will reply here."
    ))
    .with_keyboard(Keyboard::Remove)
}

pub fn application_submitted(ticket: TicketId, position: &str) -> Reply {
    Reply::text(format!(
        "✅ Your application for <b>{}</b> was submitted as ticket <b>#{ticket}</b>. We will get back to you here.",
        escape_html(position)
    ))
    .with_keyboard(Keyboard::Remove)
}

pub fn finished(ticket: TicketId) -> Reply {
    Reply::text(format!(
        "✅ Thank you! Ticket <b>#{ticket}</b> has been submitted. Our team will reply here; you can keep writing to add details."
    ))
    .with_keyboard(Keyboard::Remove)
}

pub fn cancelled() -> Reply {
    Reply::text("Cancelled. Send /start whenever you need help.").with_keyboard(Keyboard::Remove)
}

pub fn nothing_to_cancel() -> Reply {
    Reply::text("There is nothing to cancel. Send /start to open a request.")
}

pub fn existing_ticket(ticket: TicketId) -> Reply {
    Reply::text(format!(
        "You already have an open ticket <b>#{ticket}</b>. Just write here and your message will be added to it."
    ))
    .with_keyboard(Keyboard::Remove)
}

pub fn added_to_ticket(ticket: TicketId) -> Reply {
    Reply::text(format!("✉️ Added to ticket <b>#{ticket}</b>."))
}

pub fn use_start() -> Reply {
    Reply::text("Send /start to open a support request.")
}

pub fn media_not_stored() -> Reply {
    Reply::text("⚠️ The attachment could not be stored automatically; your message was still recorded.")
}

pub fn please_retry() -> Reply {
    Reply::text("⚠️ Something went wrong on our side. Please try again in a moment.")
}

pub fn blocked() -> Reply {
    Reply::text("Your access to support has been restricted.")
}
