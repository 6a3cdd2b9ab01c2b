//! Menu navigation, slash commands, and dialogue driving.

use chrono::Local;
use tracing::{debug, error, warn};

use super::{ChatBot, ChatSink, InboundMessage, Keyboard};
use crate::amortization::{self, ScheduleKind};
use crate::db::UserId;
use crate::dialogue::{Completed, ConversationState, DialogueKind, Prompt, Step};
use crate::error::{ServiceError, ServiceResult, format_error_chain};
use crate::service::AssistantService;

/// Rows shown by `/payments`
const SCHEDULE_PREVIEW_ROWS: usize = 12;
/// Entries shown under the finance summary
const RECENT_TRANSACTIONS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MenuAction {
    Tasks,
    Finance,
    Recurring,
    Credits,
    AddTask,
    ListTasks,
    AddTransaction,
    ListTransactions,
    AddRecurring,
    ListRecurring,
    AddCredit,
    ListCredits,
}

/// Button label keys and what pressing them does
const MENU: &[(&str, MenuAction)] = &[
    ("btn-tasks", MenuAction::Tasks),
    ("btn-finance", MenuAction::Finance),
    ("btn-recurring", MenuAction::Recurring),
    ("btn-credits", MenuAction::Credits),
    ("btn-add-task", MenuAction::AddTask),
    ("btn-list-tasks", MenuAction::ListTasks),
    ("btn-add-transaction", MenuAction::AddTransaction),
    ("btn-list-transactions", MenuAction::ListTransactions),
    ("btn-add-recurring", MenuAction::AddRecurring),
    ("btn-list-recurring", MenuAction::ListRecurring),
    ("btn-add-credit", MenuAction::AddCredit),
    ("btn-list-credits", MenuAction::ListCredits),
];

impl<S: ChatSink> ChatBot<S> {
    /// Route one inbound message. Messages from the same user are handled
    /// one at a time in arrival order at the lock.
    pub async fn handle_message(&self, message: InboundMessage) -> ServiceResult<()> {
        let owner = message.sender_id;
        let turn = self.begin_turn(owner).await;
        let result = self.route(message).await;
        self.end_turn(owner, turn).await;
        result
    }

    async fn route(&self, message: InboundMessage) -> ServiceResult<()> {
        let owner = message.sender_id;
        let chat_id = message.chat_id;
        let text = message.text.trim();

        if let Err(e) = self
            .service
            .register_chat_user(owner, chat_id, text)
            .await
        {
            warn!(user_id = owner, error = %format_error_chain(&e), "Failed to register chat user");
        }

        // Global reset works from anywhere, even mid-dialogue
        if text == "/start" {
            self.dialogues.end(owner).await;
            return self.reply(chat_id, self.text("welcome"), self.main_keyboard()).await;
        }
        if text == "/cancel" || text == self.text("btn-home") || text == self.text("btn-back") {
            let key = if self.dialogues.end(owner).await {
                "cancelled"
            } else {
                "menu-home"
            };
            return self.reply(chat_id, self.text(key), self.main_keyboard()).await;
        }

        if let Some(state) = self.dialogues.current(owner).await {
            return self.continue_dialogue(chat_id, state, text).await;
        }

        if text.starts_with('/') {
            return self.run_command(chat_id, owner, text).await;
        }

        match self.menu_action(text) {
            Some(action) => self.run_menu_action(chat_id, owner, action).await,
            None => {
                self.reply(chat_id, self.text("unknown-input"), self.main_keyboard())
                    .await
            }
        }
    }

    async fn continue_dialogue(
        &self,
        chat_id: i64,
        state: ConversationState,
        text: &str,
    ) -> ServiceResult<()> {
        let owner = state.owner;
        let today = Local::now().date_naive();

        match state.dialogue.step(owner, text, today) {
            Step::Invalid(prompt) => {
                let message = format!(
                    "{}\n{}",
                    self.text(prompt.invalid_key()),
                    self.text(prompt.message_key())
                );
                self.reply(chat_id, message, self.prompt_keyboard(prompt))
                    .await
            }
            Step::Continue(next) => {
                let prompt = next.prompt();
                self.dialogues.advance(owner, next).await;
                self.reply(chat_id, self.text(prompt.message_key()), self.prompt_keyboard(prompt))
                    .await
            }
            Step::Complete(completed) => {
                let dialogue = state.name();
                let outcome = self.persist(completed).await;
                // Finished or failed, the dialogue is over
                self.dialogues.end(owner).await;

                let message = match outcome {
                    Ok(message) => message,
                    Err(e) => {
                        error!(
                            user_id = owner,
                            dialogue,
                            error = %format_error_chain(&e),
                            "Failed to save dialogue result"
                        );
                        self.text("error-generic")
                    }
                };
                self.reply(chat_id, message, self.main_keyboard()).await
            }
        }
    }

    /// Store a finished dialogue's record and describe the result
    async fn persist(&self, completed: Completed) -> ServiceResult<String> {
        match completed {
            Completed::Todo(todo) => {
                let item = self.service.add_todo(todo).await?;
                Ok(self.format("todo-added", &[("title", &item.title)]))
            }
            Completed::Finance(entry) => {
                let entry = self.service.add_finance_entry(entry).await?;
                Ok(self.format(
                    "finance-added",
                    &[
                        ("kind", entry.kind.as_str()),
                        ("amount", &entry.amount.to_string()),
                        ("category", &entry.category),
                    ],
                ))
            }
            Completed::Recurring(payment) => {
                let payment = self.service.add_recurring(payment).await?;
                Ok(self.format(
                    "recurring-added",
                    &[
                        ("title", &payment.title),
                        ("date", &payment.next_due_date.to_string()),
                    ],
                ))
            }
            Completed::Credit(credit) => {
                let credit = self.service.add_credit(credit).await?;
                Ok(self.format(
                    "credit-added",
                    &[("title", &credit.title), ("id", &credit.id.to_string())],
                ))
            }
        }
    }

    async fn run_menu_action(
        &self,
        chat_id: i64,
        owner: UserId,
        action: MenuAction,
    ) -> ServiceResult<()> {
        match action {
            MenuAction::Tasks => {
                self.reply(
                    chat_id,
                    self.text("menu-tasks"),
                    self.section_keyboard("btn-add-task", "btn-list-tasks"),
                )
                .await
            }
            MenuAction::Finance => {
                self.reply(
                    chat_id,
                    self.text("menu-finance"),
                    self.section_keyboard("btn-add-transaction", "btn-list-transactions"),
                )
                .await
            }
            MenuAction::Recurring => {
                self.reply(
                    chat_id,
                    self.text("menu-recurring"),
                    self.section_keyboard("btn-add-recurring", "btn-list-recurring"),
                )
                .await
            }
            MenuAction::Credits => {
                self.reply(
                    chat_id,
                    self.text("menu-credits"),
                    self.section_keyboard("btn-add-credit", "btn-list-credits"),
                )
                .await
            }
            MenuAction::AddTask => self.start_dialogue(chat_id, owner, DialogueKind::TodoAdd).await,
            MenuAction::AddTransaction => {
                self.start_dialogue(chat_id, owner, DialogueKind::FinanceAdd)
                    .await
            }
            MenuAction::AddRecurring => {
                self.start_dialogue(chat_id, owner, DialogueKind::RecurringAdd)
                    .await
            }
            MenuAction::AddCredit => {
                self.start_dialogue(chat_id, owner, DialogueKind::CreditAdd)
                    .await
            }
            MenuAction::ListTasks => {
                let text = self.render_tasks(owner).await?;
                self.reply(chat_id, text, self.main_keyboard()).await
            }
            MenuAction::ListTransactions => {
                let text = self.render_transactions(owner).await?;
                self.reply(chat_id, text, self.main_keyboard()).await
            }
            MenuAction::ListRecurring => {
                let text = self.render_recurring(owner).await?;
                self.reply(chat_id, text, self.main_keyboard()).await
            }
            MenuAction::ListCredits => {
                let text = self.render_credits(owner).await?;
                self.reply(chat_id, text, self.main_keyboard()).await
            }
        }
    }

    async fn start_dialogue(
        &self,
        chat_id: i64,
        owner: UserId,
        kind: DialogueKind,
    ) -> ServiceResult<()> {
        let state = self.dialogues.begin(owner, kind).await;
        let prompt = state.dialogue.prompt();
        self.reply(chat_id, self.text(prompt.message_key()), self.prompt_keyboard(prompt))
            .await
    }

    async fn run_command(&self, chat_id: i64, owner: UserId, text: &str) -> ServiceResult<()> {
        let mut parts = text.split_whitespace();
        let command = parts
            .next()
            .and_then(|c| c.split('@').next())
            .unwrap_or_default();
        let id = parts.next().and_then(|arg| arg.parse::<i64>().ok());
        let option = parts.next();

        debug!(user_id = owner, command, "Chat command");

        let (usage, id) = match command {
            "/delete_todo" => ("usage-delete-todo", id),
            "/delete_recurring" => ("usage-delete-recurring", id),
            "/payments" => ("usage-payments", id),
            "/copy_credit" => ("usage-copy-credit", id),
            "/close_credit" => ("usage-close-credit", id),
            _ => {
                return self
                    .reply(chat_id, self.text("unknown-input"), self.main_keyboard())
                    .await;
            }
        };
        let Some(id) = id else {
            return self.reply(chat_id, self.text(usage), self.main_keyboard()).await;
        };

        let outcome = match command {
            "/delete_todo" => self
                .service
                .delete_todo(owner, id)
                .await
                .map(|()| self.format("todo-deleted", &[("id", &id.to_string())])),
            "/delete_recurring" => self
                .service
                .delete_recurring(owner, id)
                .await
                .map(|()| self.format("recurring-deleted", &[("id", &id.to_string())])),
            "/payments" => {
                let kind = option
                    .and_then(ScheduleKind::parse)
                    .unwrap_or(ScheduleKind::Annuity);
                self.render_schedule(owner, id, kind).await
            }
            "/copy_credit" => self.service.copy_credit(owner, id).await.map(|copy| {
                self.format(
                    "credit-copied",
                    &[("id", &copy.id.to_string()), ("title", &copy.title)],
                )
            }),
            _ => self
                .service
                .delete_credit(owner, id)
                .await
                .map(|()| self.format("credit-closed", &[("id", &id.to_string())])),
        };

        let message = match outcome {
            Ok(message) => message,
            Err(ServiceError::NotFound { id, .. }) => {
                self.format("not-found", &[("id", &id.to_string())])
            }
            Err(e) => {
                error!(
                    user_id = owner,
                    command,
                    error = %format_error_chain(&e),
                    "Chat command failed"
                );
                self.text("error-generic")
            }
        };
        self.reply(chat_id, message, self.main_keyboard()).await
    }

    // ==================== Rendering ====================

    async fn render_tasks(&self, owner: UserId) -> ServiceResult<String> {
        let todos = self.service.list_todos(owner).await?;
        if todos.is_empty() {
            return Ok(self.text("tasks-empty"));
        }

        let mut lines = vec![self.text("tasks-header")];
        for todo in &todos {
            let id = todo.id.to_string();
            lines.push(match todo.due_date {
                Some(date) => self.format(
                    "tasks-item-due",
                    &[("id", &id), ("title", &todo.title), ("date", &date.to_string())],
                ),
                None => self.format("tasks-item", &[("id", &id), ("title", &todo.title)]),
            });
        }
        Ok(lines.join("\n"))
    }

    async fn render_transactions(&self, owner: UserId) -> ServiceResult<String> {
        let entries = self.service.list_finance_entries(owner).await?;
        if entries.is_empty() {
            return Ok(self.text("finance-empty"));
        }

        let stats = crate::db::FinanceStats::from_entries(&entries);
        let mut lines = vec![self.format(
            "finance-summary",
            &[
                ("income", &stats.total_income.to_string()),
                ("expense", &stats.total_expense.to_string()),
                ("balance", &stats.balance.to_string()),
            ],
        )];
        for entry in entries.iter().take(RECENT_TRANSACTIONS) {
            lines.push(self.format(
                "finance-item",
                &[
                    ("date", &entry.created_at.date_naive().to_string()),
                    ("kind", entry.kind.as_str()),
                    ("amount", &entry.amount.to_string()),
                    ("category", &entry.category),
                ],
            ));
        }
        Ok(lines.join("\n"))
    }

    async fn render_recurring(&self, owner: UserId) -> ServiceResult<String> {
        let payments = self.service.list_recurring(owner).await?;
        if payments.is_empty() {
            return Ok(self.text("recurring-empty"));
        }

        Ok(payments
            .iter()
            .map(|p| {
                self.format(
                    "recurring-item",
                    &[
                        ("id", &p.id.to_string()),
                        ("title", &p.title),
                        ("amount", &p.amount.to_string()),
                        ("period", p.period.as_str()),
                        ("date", &p.next_due_date.to_string()),
                    ],
                )
            })
            .collect::<Vec<_>>()
            .join("\n"))
    }

    async fn render_credits(&self, owner: UserId) -> ServiceResult<String> {
        let credits = self.service.list_credits(owner).await?;
        if credits.is_empty() {
            return Ok(self.text("credits-empty"));
        }

        Ok(credits
            .iter()
            .map(|c| {
                self.format(
                    "credits-item",
                    &[
                        ("id", &c.id.to_string()),
                        ("title", &c.title),
                        ("principal", &c.principal.to_string()),
                        ("rate", &c.annual_rate_percent.to_string()),
                        ("months", &c.months.to_string()),
                    ],
                )
            })
            .collect::<Vec<_>>()
            .join("\n"))
    }

    async fn render_schedule(
        &self,
        owner: UserId,
        id: i64,
        kind: ScheduleKind,
    ) -> ServiceResult<String> {
        let credit = self.service.get_credit(owner, id).await?;
        let rows = AssistantService::schedule_for(&credit, kind, None)?;
        let preview = &rows[..rows.len().min(SCHEDULE_PREVIEW_ROWS)];

        let kind_label = match kind {
            ScheduleKind::Annuity => "annuity",
            ScheduleKind::Differentiated => "differentiated",
        };
        let mut lines = vec![self.format(
            "schedule-header",
            &[("title", &credit.title), ("kind", kind_label)],
        )];
        for row in preview {
            lines.push(self.format(
                "schedule-row",
                &[
                    ("date", &row.due_date.to_string()),
                    ("total", &row.total.to_string()),
                    ("principal", &row.principal_part.to_string()),
                    ("interest", &row.interest_part.to_string()),
                ],
            ));
        }
        lines.push(self.format(
            "schedule-total",
            &[
                ("count", &preview.len().to_string()),
                ("total", &amortization::total_paid(preview).to_string()),
            ],
        ));
        Ok(lines.join("\n"))
    }

    // ==================== Helpers ====================

    async fn reply(&self, chat_id: i64, text: String, keyboard: Keyboard) -> ServiceResult<()> {
        self.sink.send_message(chat_id, &text, &keyboard).await?;
        Ok(())
    }

    fn text(&self, key: &str) -> String {
        self.i18n.get(&self.locale, key, None)
    }

    fn format(&self, key: &str, args: &[(&str, &str)]) -> String {
        self.i18n.format(&self.locale, key, args)
    }

    fn menu_action(&self, text: &str) -> Option<MenuAction> {
        MENU.iter()
            .find(|(key, _)| self.text(key) == text)
            .map(|(_, action)| *action)
    }

    fn main_keyboard(&self) -> Keyboard {
        vec![
            vec![self.text("btn-tasks"), self.text("btn-finance")],
            vec![self.text("btn-recurring"), self.text("btn-credits")],
        ]
    }

    fn section_keyboard(&self, add_key: &str, list_key: &str) -> Keyboard {
        vec![
            vec![self.text(add_key), self.text(list_key)],
            vec![self.text("btn-home")],
        ]
    }

    fn prompt_keyboard(&self, prompt: Prompt) -> Keyboard {
        match prompt {
            Prompt::FinanceKind => vec![
                vec![self.text("btn-income"), self.text("btn-expense")],
                vec![self.text("btn-back")],
            ],
            Prompt::RecurringPeriod => vec![
                vec![self.text("btn-daily"), self.text("btn-weekly")],
                vec![self.text("btn-monthly"), self.text("btn-yearly")],
                vec![self.text("btn-back")],
            ],
            _ => vec![vec![self.text("btn-back")]],
        }
    }
}
