pub(crate) const SCHEMA_V1: &str = r#"
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS users (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    email       TEXT NOT NULL UNIQUE,
    name        TEXT NOT NULL,
    created_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS notification_preferences (
    user_id        INTEGER PRIMARY KEY REFERENCES users(id) ON DELETE CASCADE,
    email_alerts   BOOLEAN NOT NULL DEFAULT 1,
    weekly_digest  BOOLEAN NOT NULL DEFAULT 1,
    warning_pct    TEXT NOT NULL DEFAULT '75',
    critical_pct   TEXT NOT NULL DEFAULT '90'
);

CREATE TABLE IF NOT EXISTS accounts (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id      INTEGER NOT NULL REFERENCES users(id),
    name         TEXT NOT NULL,
    account_type TEXT NOT NULL DEFAULT 'Checking',
    currency     TEXT NOT NULL DEFAULT 'USD',
    created_at   TEXT NOT NULL,
    UNIQUE(user_id, name)
);

CREATE TABLE IF NOT EXISTS categories (
    id    INTEGER PRIMARY KEY AUTOINCREMENT,
    name  TEXT NOT NULL UNIQUE COLLATE NOCASE
);

CREATE TABLE IF NOT EXISTS transactions (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    account_id   INTEGER NOT NULL REFERENCES accounts(id),
    date         TEXT NOT NULL,
    description  TEXT NOT NULL,
    amount       TEXT NOT NULL,
    category_id  INTEGER REFERENCES categories(id),
    is_transfer  BOOLEAN NOT NULL DEFAULT 0,
    import_hash  TEXT NOT NULL DEFAULT '',
    created_at   TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_transactions_date ON transactions(date);
CREATE INDEX IF NOT EXISTS idx_transactions_account ON transactions(account_id);
CREATE INDEX IF NOT EXISTS idx_transactions_category ON transactions(category_id);
CREATE UNIQUE INDEX IF NOT EXISTS idx_transactions_hash_unique ON transactions(import_hash) WHERE import_hash != '';

CREATE TABLE IF NOT EXISTS transaction_splits (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    transaction_id  INTEGER NOT NULL REFERENCES transactions(id) ON DELETE CASCADE,
    category_id     INTEGER NOT NULL REFERENCES categories(id),
    amount          TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_splits_transaction ON transaction_splits(transaction_id);

CREATE TABLE IF NOT EXISTS budgets (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id     INTEGER NOT NULL REFERENCES users(id),
    name        TEXT NOT NULL,
    strategy    TEXT NOT NULL DEFAULT 'FIXED',
    is_active   BOOLEAN NOT NULL DEFAULT 1,
    created_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS budget_categories (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    budget_id      INTEGER NOT NULL REFERENCES budgets(id) ON DELETE CASCADE,
    category_id    INTEGER NOT NULL REFERENCES categories(id),
    amount         TEXT NOT NULL,
    rollover_type  TEXT NOT NULL DEFAULT 'NONE',
    rollover_cap   TEXT,
    is_income      BOOLEAN NOT NULL DEFAULT 0,
    flex_group     TEXT,
    UNIQUE(budget_id, category_id)
);

CREATE TABLE IF NOT EXISTS budget_periods (
    id               INTEGER PRIMARY KEY AUTOINCREMENT,
    budget_id        INTEGER NOT NULL REFERENCES budgets(id) ON DELETE CASCADE,
    period_start     TEXT NOT NULL,
    period_end       TEXT NOT NULL,
    status           TEXT NOT NULL DEFAULT 'OPEN',
    total_budgeted   TEXT NOT NULL DEFAULT '0',
    actual_income    TEXT NOT NULL DEFAULT '0',
    actual_expenses  TEXT NOT NULL DEFAULT '0',
    closed_at        TEXT,
    UNIQUE(budget_id, period_start)
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_budget_periods_one_open ON budget_periods(budget_id) WHERE status = 'OPEN';

CREATE TABLE IF NOT EXISTS budget_period_categories (
    id                  INTEGER PRIMARY KEY AUTOINCREMENT,
    period_id           INTEGER NOT NULL REFERENCES budget_periods(id) ON DELETE CASCADE,
    budget_category_id  INTEGER REFERENCES budget_categories(id) ON DELETE SET NULL,
    category_id         INTEGER NOT NULL REFERENCES categories(id),
    is_income           BOOLEAN NOT NULL DEFAULT 0,
    budgeted_amount     TEXT NOT NULL,
    rollover_in         TEXT NOT NULL DEFAULT '0',
    effective_budget    TEXT NOT NULL,
    actual_amount       TEXT,
    rollover_out        TEXT
);

CREATE INDEX IF NOT EXISTS idx_period_categories_period ON budget_period_categories(period_id);

CREATE TABLE IF NOT EXISTS budget_alerts (
    id                  INTEGER PRIMARY KEY AUTOINCREMENT,
    budget_id           INTEGER NOT NULL REFERENCES budgets(id) ON DELETE CASCADE,
    budget_category_id  INTEGER REFERENCES budget_categories(id) ON DELETE SET NULL,
    period_start        TEXT NOT NULL,
    alert_type          TEXT NOT NULL,
    severity            TEXT NOT NULL,
    message             TEXT NOT NULL,
    is_read             BOOLEAN NOT NULL DEFAULT 0,
    emailed             BOOLEAN NOT NULL DEFAULT 0,
    created_at          TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_budget_alerts_period ON budget_alerts(budget_id, period_start);

CREATE TABLE IF NOT EXISTS job_runs (
    job          TEXT PRIMARY KEY,
    last_run_at  TEXT NOT NULL
);
"#;

pub(crate) const CURRENT_VERSION: i32 = 1;

/// Migrations from version N to N+1.
/// Each entry is (from_version, sql).
pub(crate) const MIGRATIONS: &[(i32, &str)] = &[];
