//! The `window.desktop` object injected into session and shell pages.

use url::Url;

/// Maps `desktop.fooBar(a, b)` to the `desktop_foo_bar` callback with
/// positional arguments, and routes named `window.open` calls to satellite
/// windows. Every call returns a promise.
pub const DESKTOP_BRIDGE_SCRIPT: &str = r#"(function () {
  if (window.desktop && window.desktop.__workbenchBridge) {
    return;
  }
  var internals = window.__TAURI_INTERNALS__;
  if (!internals || typeof internals.invoke !== 'function') {
    return;
  }

  var toSnakeCase = function (name) {
    return name.replace(/[A-Z]/g, function (ch) { return '_' + ch.toLowerCase(); });
  };
  var callback = function (message, args) {
    return internals.invoke('desktop_callback', { message: message, args: args });
  };

  var base = {
    __workbenchBridge: true,
    isDesktopRuntime: function () { return internals.invoke('desktop_is_desktop_runtime'); }
  };
  window.desktop = new Proxy(base, {
    get: function (target, prop) {
      if (typeof prop !== 'string' || prop in target) {
        return target[prop];
      }
      return function () {
        return callback('desktop_' + toSnakeCase(prop), Array.prototype.slice.call(arguments));
      };
    }
  });

  var featureSize = function (features, key, fallback) {
    var match = new RegExp('(?:^|,)\\s*' + key + '\\s*=\\s*(\\d+)').exec(features || '');
    return match ? Number(match[1]) : fallback;
  };
  var nativeOpen = window.open;
  window.open = function (url, name, features) {
    if (!name || name === '_self' || name === '_parent' || name === '_top') {
      return nativeOpen.apply(window, arguments);
    }
    var target = new URL(String(url || ''), window.location.href).toString();
    callback('desktop_open_satellite_window', [
      String(name),
      target,
      featureSize(features, 'width', 800),
      featureSize(features, 'height', 600)
    ]);
    return null;
  };
})();"#;

fn same_origin(left: &Url, right: &Url) -> bool {
    left.scheme() == right.scheme()
        && left.host_str() == right.host_str()
        && left.port_or_known_default() == right.port_or_known_default()
}

/// True when `page_url` is served by the running session.
pub fn is_session_page(page_url: &Url, session_url: Option<&str>) -> bool {
    session_url
        .and_then(|session_url| Url::parse(session_url).ok())
        .is_some_and(|session_url| same_origin(page_url, &session_url))
}

/// The bridge goes into session pages and the shell's own bundled pages only.
pub fn should_inject_desktop_bridge(
    page_url: &Url,
    session_url: Option<&str>,
    asset_base: Option<&Url>,
) -> bool {
    is_session_page(page_url, session_url)
        || asset_base.is_some_and(|asset_base| same_origin(page_url, asset_base))
}
