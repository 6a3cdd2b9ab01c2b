use fluent_bundle::concurrent::FluentBundle;
use fluent_bundle::{FluentArgs, FluentResource};
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::{debug, warn};
use unic_langid::LanguageIdentifier;

/// Chat message catalogue backed by Fluent (thread-safe)
pub struct I18n {
    bundles: RwLock<HashMap<String, FluentBundle<FluentResource>>>,
    default_locale: String,
}

impl I18n {
    /// Create a catalogue with the embedded English messages
    pub fn new() -> Self {
        let i18n = Self {
            bundles: RwLock::new(HashMap::new()),
            default_locale: "en".to_string(),
        };

        i18n.load_embedded_en();

        i18n
    }

    /// Add a locale with translations
    pub fn add_locale(&self, locale: &str, content: &str) -> Result<(), String> {
        let lang_id: LanguageIdentifier = locale
            .parse()
            .map_err(|e| format!("Invalid locale '{}': {}", locale, e))?;

        let resource = FluentResource::try_new(content.to_string())
            .map_err(|(_, errors)| format!("Failed to parse Fluent resource: {:?}", errors))?;

        let mut bundle = FluentBundle::new_concurrent(vec![lang_id]);
        // Chat clients render bidi isolation marks literally
        bundle.set_use_isolating(false);
        bundle
            .add_resource(resource)
            .map_err(|errors| format!("Failed to add resource to bundle: {:?}", errors))?;

        let mut bundles = self
            .bundles
            .write()
            .map_err(|_| "Translation registry lock poisoned".to_string())?;
        bundles.insert(locale.to_string(), bundle);

        debug!(locale = %locale, "Loaded translations");

        Ok(())
    }

    /// Get a translated message
    pub fn get(&self, locale: &str, key: &str, args: Option<&FluentArgs>) -> String {
        // Requested locale, then the default, then the bare key
        self.try_get(locale, key, args)
            .or_else(|| self.try_get(&self.default_locale, key, args))
            .unwrap_or_else(|| key.to_string())
    }

    fn try_get(&self, locale: &str, key: &str, args: Option<&FluentArgs>) -> Option<String> {
        let bundles = self.bundles.read().ok()?;
        let bundle = bundles.get(locale)?;
        let message = bundle.get_message(key)?;
        let pattern = message.value()?;

        let mut errors = vec![];
        let result = bundle.format_pattern(pattern, args, &mut errors);

        if !errors.is_empty() {
            warn!(key = %key, errors = ?errors, "Fluent formatting errors");
        }

        Some(result.to_string())
    }

    /// Get a translated message with string arguments
    pub fn format(&self, locale: &str, key: &str, args: &[(&str, &str)]) -> String {
        let mut fluent_args = FluentArgs::new();
        for (k, v) in args {
            fluent_args.set(*k, *v);
        }
        self.get(locale, key, Some(&fluent_args))
    }

    fn load_embedded_en(&self) {
        let en_translations = r#"
# Personal assistant bot - English

# Menus
welcome = Hi! I keep track of your tasks, money, recurring payments and credits. Pick a section below.
menu-home = Main menu
menu-tasks = Tasks: add a new one or review your list.
menu-finance = Finance: record income or expenses and see your balance.
menu-recurring = Recurring payments are charged automatically when they fall due.
menu-credits = Credits: store a loan and see its payment plan.
cancelled = Cancelled.
unknown-input = I didn't get that. Use the menu below.

# Buttons
btn-home = Home
btn-back = Back
btn-tasks = Tasks
btn-finance = Finance
btn-recurring = Recurring
btn-credits = Credits
btn-add-task = Add task
btn-list-tasks = My tasks
btn-add-transaction = Add transaction
btn-list-transactions = Transactions
btn-add-recurring = Add recurring payment
btn-list-recurring = My recurring payments
btn-add-credit = Add credit
btn-list-credits = My credits
btn-income = Income
btn-expense = Expense
btn-daily = Daily
btn-weekly = Weekly
btn-monthly = Monthly
btn-yearly = Yearly

# Dialogue prompts
prompt-todo-title = What needs to be done?
prompt-finance-kind = Is this income or an expense?
prompt-finance-amount = Amount?
prompt-finance-category = Category?
prompt-finance-note = Description? Send "-" to skip.
prompt-recurring-title = What is the payment for?
prompt-recurring-amount = Amount per payment?
prompt-recurring-category = Category? Send "-" to use "recurring".
prompt-recurring-period = How often?
prompt-recurring-billing-day = Which day of the month (1-28)?
prompt-credit-title = Name of the credit?
prompt-credit-principal = Amount borrowed?
prompt-credit-rate = Annual interest rate in percent?
prompt-credit-months = Term in months (1-600)?

# Validation
invalid-text = Please send some text.
invalid-entry-kind = Please choose Income or Expense.
invalid-amount = Please send a positive number, e.g. 12.50 or 12,50.
invalid-rate = Please send a number that is zero or more.
invalid-months = Please send a whole number of months between 1 and 600.
invalid-period = Please choose Daily, Weekly, Monthly or Yearly.
invalid-billing-day = Please send a day between 1 and 28.

# Results
todo-added = Task added: { $title }
todo-deleted = Task #{ $id } deleted.
finance-added = Saved { $kind } of { $amount } in { $category }.
recurring-added = Recurring payment "{ $title }" saved. Next charge on { $date }.
recurring-deleted = Recurring payment #{ $id } deleted.
credit-added = Credit "{ $title }" saved as #{ $id }. See /payments { $id } for the plan.
credit-copied = Copied as credit #{ $id }: { $title }
credit-closed = Credit #{ $id } closed.
not-found = Nothing with id { $id } was found.
error-generic = Something went wrong, please try again later.

# Lists
tasks-empty = You have no tasks.
tasks-header = Your tasks:
tasks-item = #{ $id } { $title }
tasks-item-due = #{ $id } { $title } (due { $date })
finance-empty = No transactions yet.
finance-summary =
    Income: { $income }
    Expense: { $expense }
    Balance: { $balance }
finance-item = { $date } { $kind } { $amount } { $category }
recurring-empty = No recurring payments.
recurring-item = #{ $id } { $title }: { $amount } { $period }, next on { $date }
credits-empty = No credits.
credits-item = #{ $id } { $title }: { $principal } at { $rate }% for { $months } months

# Commands
usage-delete-todo = Usage: /delete_todo <id>
usage-delete-recurring = Usage: /delete_recurring <id>
usage-payments = Usage: /payments <id> [diff]
usage-copy-credit = Usage: /copy_credit <id>
usage-close-credit = Usage: /close_credit <id>
schedule-header = Payment plan for { $title } ({ $kind }):
schedule-row = { $date }: { $total } (principal { $principal }, interest { $interest })
schedule-total = Total for these { $count } payments: { $total }
"#;

        if let Err(e) = self.add_locale("en", en_translations) {
            warn!(error = %e, "Failed to load embedded English translations");
        }
    }
}

impl Default for I18n {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_message() {
        let i18n = I18n::new();

        assert_eq!(i18n.get("en", "btn-home", None), "Home");
        assert_eq!(i18n.get("en", "prompt-todo-title", None), "What needs to be done?");
    }

    #[test]
    fn test_format_without_isolation_marks() {
        let i18n = I18n::new();

        let msg = i18n.format("en", "todo-added", &[("title", "Buy milk")]);
        assert_eq!(msg, "Task added: Buy milk");
    }

    #[test]
    fn test_multiline_message() {
        let i18n = I18n::new();

        let msg = i18n.format(
            "en",
            "finance-summary",
            &[("income", "10"), ("expense", "4"), ("balance", "6")],
        );
        assert_eq!(msg, "Income: 10\nExpense: 4\nBalance: 6");
    }

    #[test]
    fn test_fallbacks() {
        let i18n = I18n::new();

        assert_eq!(i18n.get("de", "cancelled", None), "Cancelled.");
        assert_eq!(i18n.get("en", "missing-key", None), "missing-key");
    }
}
