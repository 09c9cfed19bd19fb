//! Sample templates for testing and demonstration.
//!
//! Each template exercises a different part of the fill protocol:
//! placeholders, declarative tables, and nested row paths.

/// A small form: three scalar placeholders.
pub fn form_template() -> &'static str {
    r##"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <title>Form %%number%%</title>
</head>
<body>
    <h1>Form n. %%number%%</h1>
    <div class="form-row">
        <label>Name</label>
        <p class="value">%%name%%</p>
    </div>
    <div class="form-row">
        <label>Surname</label>
        <p class="value">%%surname%%</p>
    </div>
</body>
</html>
"##
}

/// One placeholder and one flat table bound to the `data` key.
pub fn table_template() -> &'static str {
    r##"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
</head>
<body>
    <h1>Table n. %%number%%</h1>
    <inject-table items="data" class="table table-striped">
        <inject-column prop="index" label="#"></inject-column>
        <inject-column prop="name" label="Name"></inject-column>
        <inject-column prop="surname" label="Surname"></inject-column>
        <inject-column prop="email" label="Email"></inject-column>
    </inject-table>
</body>
</html>
"##
}

/// Columns reaching into nested row objects, plus an unlabeled column.
pub fn nested_table_template() -> &'static str {
    r##"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
</head>
<body>
    <h1>People, page %%number%%</h1>
    <inject-table items="data" id="people" class="table">
        <inject-column prop="index"></inject-column>
        <inject-column prop="name" label="Name"></inject-column>
        <inject-column prop="nestedObject.nestedName" label="Nested name"></inject-column>
        <inject-column prop="nestedObject.anotherNestedObject.group" label="Group"></inject-column>
    </inject-table>
</body>
</html>
"##
}
