//! Built-in portal page.

use std::path::Path;

/// Default portal page: calibration form plus a network list from `/scan`.
pub const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Device Setup</title>
    <style>
        * { box-sizing: border-box; margin: 0; padding: 0; }
        body {
            font-family: -apple-system, BlinkMacSystemFont, "Segoe UI", Roboto, sans-serif;
            background: #1a1a2e;
            color: #eee;
            min-height: 100vh;
            padding: 20px;
        }
        .container { max-width: 400px; margin: 0 auto; }
        h1 { text-align: center; margin-bottom: 24px; font-size: 24px; color: #00d4ff; }
        h2 { font-size: 16px; margin: 24px 0 12px; color: #aaa; }
        .form-group { margin-bottom: 16px; }
        label { display: block; margin-bottom: 6px; font-size: 14px; color: #aaa; }
        input {
            width: 100%;
            padding: 12px;
            border: 1px solid #333;
            border-radius: 8px;
            background: #16213e;
            color: #fff;
            font-size: 16px;
        }
        button {
            width: 100%;
            padding: 14px;
            border: none;
            border-radius: 8px;
            background: #00d4ff;
            color: #1a1a2e;
            font-size: 16px;
            font-weight: 600;
            cursor: pointer;
        }
        button:disabled { background: #555; cursor: not-allowed; }
        .message { margin-top: 16px; padding: 12px; border-radius: 8px; text-align: center; display: none; }
        .message.success { display: block; background: #0f5132; color: #d1e7dd; }
        .message.error { display: block; background: #842029; color: #f8d7da; }
        ul { list-style: none; }
        li { padding: 8px 0; border-bottom: 1px solid #333; font-size: 14px; }
        li span { float: right; color: #888; }
    </style>
</head>
<body>
    <div class="container">
        <h1>Device Setup</h1>
        <form id="calibration-form">
            <div class="form-group">
                <label for="pitch">MIDI pitch</label>
                <input type="number" id="pitch" name="pitch" min="0" max="127" required>
            </div>
            <div class="form-group">
                <label for="velocity">MIDI velocity</label>
                <input type="number" id="velocity" name="velocity" min="0" max="127">
            </div>
            <button type="submit" id="save-btn">Save</button>
        </form>
        <div id="message" class="message"></div>
        <h2>Nearby networks</h2>
        <ul id="networks"><li>Scanning...</li></ul>
    </div>
    <script>
        const form = document.getElementById('calibration-form');
        const message = document.getElementById('message');
        const saveBtn = document.getElementById('save-btn');

        function show(text, ok) {
            message.textContent = text;
            message.className = 'message ' + (ok ? 'success' : 'error');
        }

        async function scan() {
            const list = document.getElementById('networks');
            try {
                const resp = await fetch('/scan');
                const networks = await resp.json();
                list.innerHTML = '';
                if (networks.length === 0) {
                    list.innerHTML = '<li>No networks found</li>';
                }
                for (const n of networks) {
                    const li = document.createElement('li');
                    li.textContent = n.ssid;
                    const meta = document.createElement('span');
                    meta.textContent = n.strength + ' dBm' + (n.security ? ' \u{1F512}' : '');
                    li.appendChild(meta);
                    list.appendChild(li);
                }
            } catch (e) {
                list.innerHTML = '<li>Scan failed</li>';
            }
        }

        form.addEventListener('submit', async (e) => {
            e.preventDefault();
            saveBtn.disabled = true;
            try {
                const resp = await fetch('/', {
                    method: 'POST',
                    headers: { 'Content-Type': 'application/x-www-form-urlencoded' },
                    body: new URLSearchParams(new FormData(form)).toString()
                });
                if (resp.status === 204) {
                    show('Saved. Will attempt to reboot.', true);
                } else {
                    show(await resp.text(), false);
                }
            } catch (e) {
                show('Request failed', false);
            } finally {
                saveBtn.disabled = false;
            }
        });

        scan();
    </script>
</body>
</html>
"#;

/// Write the built-in page to `root/file` unless something is already there.
/// Returns whether the file was created.
pub fn install_default_page(root: &Path, file: &str) -> std::io::Result<bool> {
    let path = root.join(file.trim_start_matches('/'));
    if path.exists() {
        return Ok(false);
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&path, INDEX_HTML)?;
    log::info!("Installed default portal page at {}", path.display());
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_install_keeps_existing_page() {
        let dir = tempfile::tempdir().unwrap();
        assert!(install_default_page(dir.path(), "/index.html").unwrap());
        let page = std::fs::read_to_string(dir.path().join("index.html")).unwrap();
        assert!(page.contains("fetch('/scan')"));

        std::fs::write(dir.path().join("index.html"), "custom").unwrap();
        assert!(!install_default_page(dir.path(), "/index.html").unwrap());
        let page = std::fs::read_to_string(dir.path().join("index.html")).unwrap();
        assert_eq!(page, "custom");
    }
}
