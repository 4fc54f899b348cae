//! SQL schema for the Agora SQLite store.
//!
//! Executed once at connection startup. `ON DELETE CASCADE` carries the
//! ownership rules: a branch owns its topics, a topic owns its posts, poll and
//! subscriptions.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS sections (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    name        TEXT    NOT NULL,
    description TEXT,
    position    INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS branches (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    section_id  INTEGER NOT NULL REFERENCES sections(id) ON DELETE CASCADE,
    name        TEXT    NOT NULL,
    description TEXT,
    position    INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS users (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    username       TEXT    NOT NULL UNIQUE,
    email          TEXT    NOT NULL UNIQUE,
    password_hash  TEXT    NOT NULL,
    language       TEXT    NOT NULL,   -- 'english' | 'russian' | ...
    enabled        INTEGER NOT NULL,
    activation_key TEXT    NOT NULL UNIQUE,
    registered_at  TEXT    NOT NULL,
    last_login     TEXT,
    version        INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS user_groups (
    id   INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT    NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS group_members (
    group_id INTEGER NOT NULL REFERENCES user_groups(id) ON DELETE CASCADE,
    user_id  INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    PRIMARY KEY (group_id, user_id)
);

CREATE TABLE IF NOT EXISTS topics (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    branch_id     INTEGER NOT NULL REFERENCES branches(id) ON DELETE CASCADE,
    title         TEXT    NOT NULL,
    topic_starter INTEGER NOT NULL REFERENCES users(id),
    created_at    TEXT    NOT NULL,
    modified_at   TEXT    NOT NULL,
    closed        INTEGER NOT NULL DEFAULT 0,
    sticky        INTEGER NOT NULL DEFAULT 0,
    announcement  INTEGER NOT NULL DEFAULT 0,
    code_review   INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS topics_branch ON topics (branch_id);

CREATE TABLE IF NOT EXISTS posts (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    topic_id    INTEGER NOT NULL REFERENCES topics(id) ON DELETE CASCADE,
    author_id   INTEGER NOT NULL REFERENCES users(id),
    content     TEXT    NOT NULL,
    created_at  TEXT    NOT NULL,
    modified_at TEXT
);

CREATE INDEX IF NOT EXISTS posts_topic ON posts (topic_id);

CREATE TABLE IF NOT EXISTS polls (
    id               INTEGER PRIMARY KEY AUTOINCREMENT,
    topic_id         INTEGER NOT NULL UNIQUE REFERENCES topics(id) ON DELETE CASCADE,
    title            TEXT    NOT NULL,
    ending_date      TEXT,
    multiple_answers INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS poll_items (
    id       INTEGER PRIMARY KEY AUTOINCREMENT,
    poll_id  INTEGER NOT NULL REFERENCES polls(id) ON DELETE CASCADE,
    name     TEXT    NOT NULL,
    votes    INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS poll_voters (
    poll_id INTEGER NOT NULL REFERENCES polls(id) ON DELETE CASCADE,
    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    PRIMARY KEY (poll_id, user_id)
);

CREATE TABLE IF NOT EXISTS topic_subscriptions (
    topic_id INTEGER NOT NULL REFERENCES topics(id) ON DELETE CASCADE,
    user_id  INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    PRIMARY KEY (topic_id, user_id)
);

CREATE TABLE IF NOT EXISTS sessions (
    token       TEXT    PRIMARY KEY,
    user_id     INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    remember_me INTEGER NOT NULL,
    created_at  TEXT    NOT NULL,
    expires_at  TEXT    NOT NULL
);

CREATE INDEX IF NOT EXISTS session_expiry ON sessions (expires_at);

CREATE TABLE IF NOT EXISTS private_messages (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    author_id    INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    recipient_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    title        TEXT    NOT NULL,
    body         TEXT    NOT NULL,
    created_at   TEXT    NOT NULL,
    read         INTEGER NOT NULL DEFAULT 0,
    status       TEXT    NOT NULL    -- 'DRAFT' | 'SENT' | 'DELETED_FROM_INBOX' | 'DELETED_FROM_OUTBOX'
);

CREATE INDEX IF NOT EXISTS pm_recipient ON private_messages (recipient_id, status);
CREATE INDEX IF NOT EXISTS pm_author    ON private_messages (author_id, status);

-- Entry order is preserved through the rowid.
CREATE TABLE IF NOT EXISTS acl_entries (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    object_type TEXT    NOT NULL,
    object_id   INTEGER NOT NULL,
    sid_kind    TEXT    NOT NULL,    -- 'anonymous' | 'user' | 'group'
    sid_id      INTEGER,
    permission  TEXT    NOT NULL,    -- e.g. 'BranchPermission.VIEW_TOPICS'
    granting    INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS acl_object ON acl_entries (object_type, object_id);
";
