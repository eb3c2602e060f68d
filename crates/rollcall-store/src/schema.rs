pub(crate) const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS students (
    seq               INTEGER PRIMARY KEY AUTOINCREMENT,
    roll_no           TEXT NOT NULL UNIQUE,
    name              TEXT NOT NULL,
    photo_path        TEXT NOT NULL,
    department_id     TEXT,
    year              TEXT,
    subject_ids       TEXT NOT NULL DEFAULT '[]',
    registration_date TEXT NOT NULL,
    email             TEXT
);

CREATE TABLE IF NOT EXISTS attendance (
    id      INTEGER PRIMARY KEY AUTOINCREMENT,
    roll_no TEXT NOT NULL,
    date    TEXT NOT NULL,
    status  TEXT NOT NULL,
    time    TEXT NOT NULL,
    source  TEXT NOT NULL,
    UNIQUE(roll_no, date)
);
CREATE INDEX IF NOT EXISTS attendance_by_date ON attendance(date);

CREATE TABLE IF NOT EXISTS pending_students (
    seq               INTEGER PRIMARY KEY AUTOINCREMENT,
    roll_no           TEXT NOT NULL UNIQUE,
    name              TEXT NOT NULL,
    email             TEXT NOT NULL,
    photo_path        TEXT NOT NULL,
    department_id     TEXT,
    year              TEXT,
    subject_ids       TEXT NOT NULL DEFAULT '[]',
    registration_date TEXT NOT NULL,
    status            TEXT NOT NULL DEFAULT 'pending'
);

CREATE TABLE IF NOT EXISTS teachers (
    email         TEXT PRIMARY KEY,
    name          TEXT NOT NULL,
    password_hash TEXT NOT NULL,
    school        TEXT NOT NULL,
    phone         TEXT NOT NULL,
    class_details TEXT NOT NULL DEFAULT '[]',
    registered_at TEXT NOT NULL
);
";
