//! Dialogue states and the pure transition function.
//!
//! Every state carries exactly what has been gathered so far. [`transition`] never touches
//! the store or the network; it returns the next state plus the effects the engine must run.

use crate::{
    conversation::prompts,
    domain::{Category, MessageKind, TicketId},
    messaging::types::{MediaInput, Reply},
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DialogueState {
    ChoosingCategory,
    Payment { ticket: TicketId, step: PaymentStep },
    Dispute { ticket: TicketId, step: DisputeStep },
    Question { ticket: TicketId },
    Employment { ticket: TicketId, step: EmploymentStep },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PaymentStep {
    OrderReference,
    SendAddress { order: String },
    Currency { order: String, address: String },
    Amount { order: String, address: String, currency: String },
    /// Open-ended: everything is appended until `/finish`.
    Continuing { order: String, extra: u32 },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DisputeStep {
    OrderReference,
    HasVideo { order: String },
    Video { order: String },
    HasPhotos { order: String, video: bool },
    Photos { order: String, video: bool, photos: u32 },
    Description { order: String, video: bool, photos: u32 },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EmploymentStep {
    About,
    Position { about: String },
    Experience { about: String, position: String },
}

/// Dialogue input after `/start` and `/cancel` have been handled by the engine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Input {
    Text(String),
    Media(MediaInput),
    Finish,
    /// Unknown commands and unsupported message types.
    Unrecognized,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Next {
    Stay,
    Goto(DialogueState),
    /// Create the ticket, then enter the category's first collection state.
    OpenTicket(Category),
    End,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Effect {
    RecordText(String),
    RecordMedia(MediaInput),
    Reply(Reply),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Step {
    pub next: Next,
    pub effects: Vec<Effect>,
}

impl Step {
    fn stay(reply: Reply) -> Self {
        Self {
            next: Next::Stay,
            effects: vec![Effect::Reply(reply)],
        }
    }

    fn goto(state: DialogueState, effects: Vec<Effect>) -> Self {
        Self {
            next: Next::Goto(state),
            effects,
        }
    }

    fn end(effects: Vec<Effect>) -> Self {
        Self {
            next: Next::End,
            effects,
        }
    }
}

impl DialogueState {
    /// State entered right after the ticket for `category` was created, with its greeting.
    pub fn opened(category: Category, ticket: TicketId) -> (Self, Reply) {
        let header = prompts::ticket_opened(ticket, category);
        let (state, first) = match category {
            Category::PaymentDispute => (
                DialogueState::Payment {
                    ticket,
                    step: PaymentStep::OrderReference,
                },
                prompts::ask_order_reference(),
            ),
            Category::Dispute => (
                DialogueState::Dispute {
                    ticket,
                    step: DisputeStep::OrderReference,
                },
                prompts::ask_order_reference(),
            ),
            Category::GeneralQuestion => (DialogueState::Question { ticket }, prompts::ask_question()),
            Category::Employment => (
                DialogueState::Employment {
                    ticket,
                    step: EmploymentStep::About,
                },
                prompts::ask_about(),
            ),
        };
        let reply = Reply::text(format!("{header}\n\n{first}"))
            .with_keyboard(crate::messaging::types::Keyboard::Remove);
        (state, reply)
    }

    pub fn ticket(&self) -> Option<TicketId> {
        match self {
            DialogueState::ChoosingCategory => None,
            DialogueState::Payment { ticket, .. }
            | DialogueState::Dispute { ticket, .. }
            | DialogueState::Question { ticket }
            | DialogueState::Employment { ticket, .. } => Some(*ticket),
        }
    }

    /// Re-prompt for the current state.
    pub fn prompt(&self) -> Reply {
        match self {
            DialogueState::ChoosingCategory => prompts::category_retry(),
            DialogueState::Payment { ticket, step } => match step {
                PaymentStep::OrderReference => Reply::text(prompts::ask_order_reference()),
                PaymentStep::SendAddress { .. } => prompts::ask_send_address(),
                PaymentStep::Currency { .. } => prompts::ask_currency(),
                PaymentStep::Amount { .. } => prompts::ask_amount(),
                PaymentStep::Continuing { .. } => prompts::payment_continue(*ticket),
            },
            DialogueState::Dispute { step, .. } => match step {
                DisputeStep::OrderReference => Reply::text(prompts::ask_order_reference()),
                DisputeStep::HasVideo { .. } => prompts::ask_has_video(),
                DisputeStep::Video { .. } => prompts::ask_video(),
                DisputeStep::HasPhotos { .. } => prompts::ask_has_photos(),
                DisputeStep::Photos { .. } => prompts::ask_photos(),
                DisputeStep::Description { .. } => prompts::ask_description(),
            },
            DialogueState::Question { .. } => Reply::text(prompts::ask_question()),
            DialogueState::Employment { step, .. } => match step {
                EmploymentStep::About => Reply::text(prompts::ask_about()),
                EmploymentStep::Position { .. } => prompts::ask_position(),
                EmploymentStep::Experience { .. } => prompts::ask_experience(),
            },
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Answer {
    Yes,
    No,
}

fn parse_answer(text: &str) -> Option<Answer> {
    let t = text
        .trim()
        .trim_start_matches(|c: char| !c.is_alphanumeric())
        .trim_end_matches(|c: char| !c.is_alphanumeric())
        .to_lowercase();
    match t.as_str() {
        "yes" | "y" | "yeah" | "yep" | "sure" => Some(Answer::Yes),
        "no" | "n" | "nope" | "skip" => Some(Answer::No),
        _ => None,
    }
}

fn is_done(text: &str) -> bool {
    matches!(
        text.trim()
            .trim_start_matches(|c: char| !c.is_alphanumeric())
            .to_lowercase()
            .as_str(),
        "done" | "that's all" | "thats all"
    )
}

fn non_empty(text: &str) -> Option<&str> {
    let t = text.trim();
    (!t.is_empty()).then_some(t)
}

/// Compute the next step for `state` given `input`.
pub fn transition(state: &DialogueState, input: &Input) -> Step {
    if let Input::Finish = input {
        return match state.ticket() {
            Some(ticket) => Step::end(vec![Effect::Reply(prompts::finished(ticket))]),
            None => Step::end(vec![Effect::Reply(prompts::cancelled())]),
        };
    }

    match state {
        DialogueState::ChoosingCategory => match input {
            Input::Text(t) => match Category::from_choice(t) {
                Some(category) => Step {
                    next: Next::OpenTicket(category),
                    effects: Vec::new(),
                },
                None => Step::stay(state.prompt()),
            },
            _ => Step::stay(state.prompt()),
        },
        DialogueState::Payment { ticket, step } => payment(*ticket, step, input, state),
        DialogueState::Dispute { ticket, step } => dispute(*ticket, step, input, state),
        DialogueState::Question { ticket } => match input {
            Input::Text(t) => match non_empty(t) {
                Some(t) => Step::end(vec![
                    Effect::RecordText(t.to_string()),
                    Effect::Reply(prompts::question_submitted(*ticket)),
                ]),
                None => Step::stay(state.prompt()),
            },
            Input::Media(m) => Step {
                next: Next::Stay,
                effects: vec![
                    Effect::RecordMedia(m.clone()),
                    Effect::Reply(prompts::question_attachment_added()),
                ],
            },
            _ => Step::stay(state.prompt()),
        },
        DialogueState::Employment { ticket, step } => employment(*ticket, step, input, state),
    }
}

fn payment(ticket: TicketId, step: &PaymentStep, input: &Input, state: &DialogueState) -> Step {
    let at = |step: PaymentStep| DialogueState::Payment { ticket, step };

    // The fixed questions before the open-ended part take text only.
    if !matches!(step, PaymentStep::Continuing { .. }) {
        let text = match input {
            Input::Text(t) => non_empty(t),
            Input::Media(_) => {
                return Step::stay(Reply::text(format!(
                    "{} {}",
                    prompts::text_expected(),
                    state.prompt().text
                )))
            }
            _ => None,
        };
        let Some(t) = text else {
            return Step::stay(state.prompt());
        };

        return match step {
            PaymentStep::OrderReference => Step::goto(
                at(PaymentStep::SendAddress {
                    order: t.to_string(),
                }),
                vec![
                    Effect::RecordText(t.to_string()),
                    Effect::Reply(prompts::ask_send_address()),
                ],
            ),
            PaymentStep::SendAddress { order } => Step::goto(
                at(PaymentStep::Currency {
                    order: order.clone(),
                    address: t.to_string(),
                }),
                vec![
                    Effect::RecordText(format!("Send address: {t}")),
                    Effect::Reply(prompts::ask_currency()),
                ],
            ),
            PaymentStep::Currency { order, address } => Step::goto(
                at(PaymentStep::Amount {
                    order: order.clone(),
                    address: address.clone(),
                    currency: t.to_string(),
                }),
                vec![
                    Effect::RecordText(format!("Currency: {t}")),
                    Effect::Reply(prompts::ask_amount()),
                ],
            ),
            PaymentStep::Amount { order, .. } => Step::goto(
                at(PaymentStep::Continuing {
                    order: order.clone(),
                    extra: 0,
                }),
                vec![
                    Effect::RecordText(format!("Amount: {t}")),
                    Effect::Reply(prompts::payment_continue(ticket)),
                ],
            ),
            PaymentStep::Continuing { .. } => Step::stay(state.prompt()),
        };
    }

    let PaymentStep::Continuing { order, extra } = step else {
        return Step::stay(state.prompt());
    };
    let record = match input {
        Input::Text(t) => match non_empty(t) {
            Some(t) => Effect::RecordText(t.to_string()),
            None => return Step::stay(state.prompt()),
        },
        Input::Media(m) => Effect::RecordMedia(m.clone()),
        _ => return Step::stay(state.prompt()),
    };
    Step::goto(
        at(PaymentStep::Continuing {
            order: order.clone(),
            extra: extra + 1,
        }),
        vec![record, Effect::Reply(prompts::payment_added(ticket))],
    )
}

fn dispute(ticket: TicketId, step: &DisputeStep, input: &Input, state: &DialogueState) -> Step {
    let at = |step: DisputeStep| DialogueState::Dispute { ticket, step };

    match step {
        DisputeStep::OrderReference => match input {
            Input::Text(t) => match non_empty(t) {
                Some(order) => Step::goto(
                    at(DisputeStep::HasVideo {
                        order: order.to_string(),
                    }),
                    vec![
                        Effect::RecordText(order.to_string()),
                        Effect::Reply(prompts::ask_has_video()),
                    ],
                ),
                None => Step::stay(state.prompt()),
            },
            _ => Step::stay(state.prompt()),
        },
        DisputeStep::HasVideo { order } => match input {
            Input::Text(t) => match parse_answer(t) {
                Some(Answer::Yes) => Step::goto(
                    at(DisputeStep::Video {
                        order: order.clone(),
                    }),
                    vec![Effect::Reply(prompts::ask_video())],
                ),
                Some(Answer::No) => Step::goto(
                    at(DisputeStep::HasPhotos {
                        order: order.clone(),
                        video: false,
                    }),
                    vec![Effect::Reply(prompts::ask_has_photos())],
                ),
                None => Step::stay(state.prompt()),
            },
            // Sending the evidence directly counts as "yes".
            Input::Media(m) if m.kind == MessageKind::Photo => Step::goto(
                at(DisputeStep::Photos {
                    order: order.clone(),
                    video: false,
                    photos: 1,
                }),
                vec![
                    Effect::RecordMedia(m.clone()),
                    Effect::Reply(prompts::photo_received(1)),
                ],
            ),
            Input::Media(m) => Step::goto(
                at(DisputeStep::HasPhotos {
                    order: order.clone(),
                    video: true,
                }),
                vec![
                    Effect::RecordMedia(m.clone()),
                    Effect::Reply(prompts::ask_has_photos()),
                ],
            ),
            _ => Step::stay(state.prompt()),
        },
        DisputeStep::Video { order } => match input {
            Input::Media(m) if m.kind != MessageKind::Photo => Step::goto(
                at(DisputeStep::HasPhotos {
                    order: order.clone(),
                    video: true,
                }),
                vec![
                    Effect::RecordMedia(m.clone()),
                    Effect::Reply(prompts::ask_has_photos()),
                ],
            ),
            Input::Text(t) if parse_answer(t) == Some(Answer::No) => Step::goto(
                at(DisputeStep::HasPhotos {
                    order: order.clone(),
                    video: false,
                }),
                vec![Effect::Reply(prompts::ask_has_photos())],
            ),
            _ => Step::stay(state.prompt()),
        },
        DisputeStep::HasPhotos { order, video } => match input {
            Input::Text(t) => match parse_answer(t) {
                Some(Answer::Yes) => Step::goto(
                    at(DisputeStep::Photos {
                        order: order.clone(),
                        video: *video,
                        photos: 0,
                    }),
                    vec![Effect::Reply(prompts::ask_photos())],
                ),
                Some(Answer::No) => Step::goto(
                    at(DisputeStep::Description {
                        order: order.clone(),
                        video: *video,
                        photos: 0,
                    }),
                    vec![Effect::Reply(prompts::ask_description())],
                ),
                None => Step::stay(state.prompt()),
            },
            Input::Media(m) => Step::goto(
                at(DisputeStep::Photos {
                    order: order.clone(),
                    video: *video,
                    photos: 1,
                }),
                vec![
                    Effect::RecordMedia(m.clone()),
                    Effect::Reply(prompts::photo_received(1)),
                ],
            ),
            _ => Step::stay(state.prompt()),
        },
        DisputeStep::Photos {
            order,
            video,
            photos,
        } => match input {
            Input::Media(m) => Step::goto(
                at(DisputeStep::Photos {
                    order: order.clone(),
                    video: *video,
                    photos: photos + 1,
                }),
                vec![
                    Effect::RecordMedia(m.clone()),
                    Effect::Reply(prompts::photo_received(photos + 1)),
                ],
            ),
            Input::Text(t) if is_done(t) => Step::goto(
                at(DisputeStep::Description {
                    order: order.clone(),
                    video: *video,
                    photos: *photos,
                }),
                vec![Effect::Reply(prompts::ask_description())],
            ),
            _ => Step::stay(state.prompt()),
        },
        DisputeStep::Description {
            order,
            video,
            photos,
        } => match input {
            Input::Text(t) => match non_empty(t) {
                Some(t) => Step::end(vec![
                    Effect::RecordText(t.to_string()),
                    Effect::Reply(prompts::dispute_summary(ticket, order, *video, *photos)),
                ]),
                None => Step::stay(state.prompt()),
            },
            _ => Step::stay(state.prompt()),
        },
    }
}

fn employment(
    ticket: TicketId,
    step: &EmploymentStep,
    input: &Input,
    state: &DialogueState,
) -> Step {
    let Input::Text(t) = input else {
        return Step::stay(state.prompt());
    };
    let Some(text) = non_empty(t) else {
        return Step::stay(state.prompt());
    };
    let record = Effect::RecordText(text.to_string());

    match step {
        EmploymentStep::About => Step::goto(
            DialogueState::Employment {
                ticket,
                step: EmploymentStep::Position {
                    about: text.to_string(),
                },
            },
            vec![record, Effect::Reply(prompts::ask_position())],
        ),
        EmploymentStep::Position { about } => Step::goto(
            DialogueState::Employment {
                ticket,
                step: EmploymentStep::Experience {
                    about: about.clone(),
                    position: text.to_string(),
                },
            },
            vec![record, Effect::Reply(prompts::ask_experience())],
        ),
        EmploymentStep::Experience { position, .. } => Step::end(vec![
            record,
            Effect::Reply(prompts::application_submitted(ticket, position)),
        ]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T: TicketId = TicketId(9);

    fn text(s: &str) -> Input {
        Input::Text(s.to_string())
    }

    fn media(kind: MessageKind) -> Input {
        Input::Media(MediaInput {
            kind,
            handle: "h".to_string(),
            caption: None,
            file_name: None,
        })
    }

    fn records(step: &Step) -> usize {
        step.effects
            .iter()
            .filter(|e| matches!(e, Effect::RecordText(_) | Effect::RecordMedia(_)))
            .count()
    }

    fn goto(step: Step) -> DialogueState {
        match step.next {
            Next::Goto(s) => s,
            other => panic!("expected goto, got {other:?}"),
        }
    }

    #[test]
    fn category_selection_opens_ticket_or_reprompts() {
        let s = DialogueState::ChoosingCategory;
        assert_eq!(
            transition(&s, &text("⚖️ Dispute")).next,
            Next::OpenTicket(Category::Dispute)
        );

        let step = transition(&s, &text("I want my money"));
        assert_eq!(step.next, Next::Stay);
        assert_eq!(records(&step), 0);

        assert_eq!(transition(&s, &media(MessageKind::Photo)).next, Next::Stay);
        assert_eq!(transition(&s, &Input::Finish).next, Next::End);
    }

    #[test]
    fn dispute_walks_video_photos_description() {
        let (s, _) = DialogueState::opened(Category::Dispute, T);
        let step = transition(&s, &text("order #123"));
        assert_eq!(step.effects[0], Effect::RecordText("order #123".to_string()));
        let s = goto(step);

        let s = goto(transition(&s, &text("yes")));
        assert!(matches!(
            s,
            DialogueState::Dispute {
                step: DisputeStep::Video { .. },
                ..
            }
        ));

        let step = transition(&s, &media(MessageKind::Video));
        assert_eq!(records(&step), 1);
        let s = goto(step);

        let s = goto(transition(&s, &text("Yes")));
        let s = goto(transition(&s, &media(MessageKind::Photo)));
        let s = goto(transition(&s, &media(MessageKind::Photo)));
        assert_eq!(
            s,
            DialogueState::Dispute {
                ticket: T,
                step: DisputeStep::Photos {
                    order: "order #123".to_string(),
                    video: true,
                    photos: 2
                }
            }
        );

        // Free text while collecting photos is not "Done".
        assert_eq!(transition(&s, &text("wait")).next, Next::Stay);

        let s = goto(transition(&s, &text("Done")));
        let step = transition(&s, &text("the box was empty"));
        assert_eq!(step.next, Next::End);
        assert_eq!(records(&step), 1);
        let Some(Effect::Reply(summary)) = step.effects.last() else {
            panic!("expected a summary reply");
        };
        assert!(summary.text.contains("Video: yes"));
        assert!(summary.text.contains("Photos: 2"));
    }

    #[test]
    fn dispute_media_at_question_step_counts_as_yes() {
        let s = DialogueState::Dispute {
            ticket: T,
            step: DisputeStep::HasVideo {
                order: "A1".to_string(),
            },
        };
        let s = goto(transition(&s, &media(MessageKind::Video)));
        assert_eq!(
            s,
            DialogueState::Dispute {
                ticket: T,
                step: DisputeStep::HasPhotos {
                    order: "A1".to_string(),
                    video: true
                }
            }
        );

        let step = transition(&s, &media(MessageKind::Photo));
        assert_eq!(records(&step), 1);
        assert!(matches!(
            goto(step),
            DialogueState::Dispute {
                step: DisputeStep::Photos { photos: 1, .. },
                ..
            }
        ));
    }

    #[test]
    fn dispute_no_answers_skip_to_description() {
        let s = DialogueState::Dispute {
            ticket: T,
            step: DisputeStep::HasVideo {
                order: "A1".to_string(),
            },
        };
        let s = goto(transition(&s, &text("No")));
        let step = transition(&s, &text("maybe"));
        assert_eq!(step.next, Next::Stay);
        let s = goto(transition(&s, &text("no")));
        assert!(matches!(
            s,
            DialogueState::Dispute {
                step: DisputeStep::Description {
                    video: false,
                    photos: 0,
                    ..
                },
                ..
            }
        ));
    }

    #[test]
    fn payment_asks_address_currency_and_amount() {
        let (s, _) = DialogueState::opened(Category::PaymentDispute, T);
        let s = goto(transition(&s, &text("order 77")));
        assert_eq!(s.prompt(), prompts::ask_send_address());

        // Attachments are refused until the fixed questions are answered.
        let step = transition(&s, &media(MessageKind::Photo));
        assert_eq!((step.next.clone(), records(&step)), (Next::Stay, 0));

        let step = transition(&s, &text("bc1qxyz"));
        assert_eq!(
            step.effects[0],
            Effect::RecordText("Send address: bc1qxyz".to_string())
        );
        let s = goto(step);
        assert_eq!(s.prompt(), prompts::ask_currency());

        let s = goto(transition(&s, &text("USDT (TRC20)")));
        assert_eq!(
            s,
            DialogueState::Payment {
                ticket: T,
                step: PaymentStep::Amount {
                    order: "order 77".to_string(),
                    address: "bc1qxyz".to_string(),
                    currency: "USDT (TRC20)".to_string(),
                },
            }
        );
        assert_eq!(transition(&s, &text("  ")).next, Next::Stay);

        let step = transition(&s, &text("150"));
        assert_eq!(step.effects[0], Effect::RecordText("Amount: 150".to_string()));
        assert_eq!(
            goto(step),
            DialogueState::Payment {
                ticket: T,
                step: PaymentStep::Continuing {
                    order: "order 77".to_string(),
                    extra: 0,
                },
            }
        );
    }

    #[test]
    fn payment_collects_until_finish() {
        let (s, _) = DialogueState::opened(Category::PaymentDispute, T);
        let s = goto(transition(&s, &text("tx 0xabc")));
        let s = goto(transition(&s, &text("0xdead")));
        let s = goto(transition(&s, &text("ETH")));
        let s = goto(transition(&s, &text("0.5")));
        let step = transition(&s, &text("paid twice"));
        assert_eq!(records(&step), 1);
        let s = goto(step);
        let step = transition(&s, &media(MessageKind::Document));
        assert_eq!(records(&step), 1);
        let s = goto(step);

        let step = transition(&s, &Input::Finish);
        assert_eq!(step.next, Next::End);
        assert_eq!(records(&step), 0);
    }

    #[test]
    fn question_closes_on_text() {
        let (s, _) = DialogueState::opened(Category::GeneralQuestion, T);
        let step = transition(&s, &media(MessageKind::Photo));
        assert_eq!((step.next.clone(), records(&step)), (Next::Stay, 1));
        let step = transition(&s, &text("Where is my parcel?"));
        assert_eq!(step.next, Next::End);
        assert_eq!(records(&step), 1);
    }

    #[test]
    fn employment_three_text_steps() {
        let (s, _) = DialogueState::opened(Category::Employment, T);
        assert_eq!(transition(&s, &media(MessageKind::Photo)).next, Next::Stay);
        let s = goto(transition(&s, &text("I am Sam")));
        let s = goto(transition(&s, &text("Courier")));
        let step = transition(&s, &text("3 years"));
        assert_eq!(step.next, Next::End);
        let Some(Effect::Reply(r)) = step.effects.last() else {
            panic!("expected reply");
        };
        assert!(r.text.contains("Courier"));
    }

    #[test]
    fn unrecognized_input_reprompts_in_place() {
        let s = DialogueState::Employment {
            ticket: T,
            step: EmploymentStep::About,
        };
        let step = transition(&s, &Input::Unrecognized);
        assert_eq!(step.next, Next::Stay);
        assert_eq!(step.effects, vec![Effect::Reply(s.prompt())]);
        assert_eq!(transition(&s, &text("   ")).next, Next::Stay);
    }

    #[test]
    fn finish_mid_dialogue_names_ticket() {
        let s = DialogueState::Dispute {
            ticket: T,
            step: DisputeStep::OrderReference,
        };
        let step = transition(&s, &Input::Finish);
        assert_eq!(step.next, Next::End);
        let Some(Effect::Reply(r)) = step.effects.first() else {
            panic!("expected reply");
        };
        assert!(r.text.contains("#9"));
    }
}
