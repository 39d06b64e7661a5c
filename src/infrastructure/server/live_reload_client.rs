/// WebSocket endpoint browsers connect to.
pub const LIVE_RELOAD_PATH: &str = "/__assetflow/livereload";
/// Script injected into every served HTML page.
pub const CLIENT_SCRIPT_PATH: &str = "/__assetflow/livereload.js";

/// Browser side of live reload. Plain ES5 so it runs wherever the bundle does.
pub fn client_script() -> String {
    format!(
        r#"(function () {{
  "use strict";
  var delay = 1000;

  function connect() {{
    var scheme = location.protocol === "https:" ? "wss://" : "ws://";
    var socket = new WebSocket(scheme + location.host + "{path}");

    socket.onopen = function () {{
      delay = 1000;
    }};

    socket.onmessage = function (event) {{
      var message;
      try {{
        message = JSON.parse(event.data);
      }} catch (e) {{
        return;
      }}
      if (message.type === "reload") {{
        location.reload();
      }}
    }};

    socket.onclose = function () {{
      setTimeout(connect, delay);
      delay = Math.min(delay * 2, 10000);
    }};
  }}

  connect();
}})();
"#,
        path = LIVE_RELOAD_PATH
    )
}

/// Adds the client script tag before the last `</body>`, or at the end of
/// documents without one.
pub fn inject_client(html: &str) -> String {
    let tag = format!(r#"<script src="{}"></script>"#, CLIENT_SCRIPT_PATH);

    match html.to_ascii_lowercase().rfind("</body>") {
        Some(index) => {
            let mut injected = String::with_capacity(html.len() + tag.len());
            injected.push_str(&html[..index]);
            injected.push_str(&tag);
            injected.push_str(&html[index..]);
            injected
        }
        None => format!("{}{}", html, tag),
    }
}
