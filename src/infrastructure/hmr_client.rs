/// HMR client-side JavaScript runtime.
///
/// This is the module browsers load from `/@ember/client`; every instrumented
/// module imports `createHotContext` from it.
pub fn generate_hmr_client_code(host: &str, port: u16) -> String {
    CLIENT_TEMPLATE
        .replace("__EMBER_HMR_HOST__", &host.replace('\\', "\\\\").replace('"', "\\\""))
        .replace("__EMBER_HMR_PORT__", &port.to_string())
}

const CLIENT_TEMPLATE: &str = r#"// Ember HMR client runtime
const socketHost = "__EMBER_HMR_HOST__";
const socketPort = __EMBER_HMR_PORT__;
const socket = new WebSocket(`ws://${socketHost}:${socketPort}`);

const hotModulesMap = new Map();
const disposeMap = new Map();
const pruneMap = new Map();
const dataMap = new Map();
const customListenersMap = new Map();

// messages are applied one at a time, in arrival order
let queue = Promise.resolve();

socket.addEventListener('message', ({ data }) => {
    let payload;
    try {
        payload = JSON.parse(data);
    } catch (error) {
        console.warn('[ember] Ignoring malformed message:', error);
        return;
    }
    queue = queue.then(() => handleMessage(payload));
});

socket.addEventListener('close', () => {
    console.log('[ember] server connection lost.');
});

async function handleMessage(payload) {
    switch (payload.type) {
        case 'connected':
            console.debug('[ember] connected.');
            notifyListeners('vite:ws:connect', {});
            break;
        case 'update':
            notifyListeners('vite:beforeUpdate', payload);
            for (const update of payload.updates) {
                if (!(await fetchUpdate(update))) {
                    return;
                }
            }
            notifyListeners('vite:afterUpdate', payload);
            break;
        case 'prune':
            notifyListeners('vite:beforePrune', payload);
            for (const path of payload.paths) {
                pruneModule(path);
            }
            break;
        case 'full-reload':
            notifyListeners('vite:beforeFullReload', payload);
            location.reload();
            break;
        case 'error':
            notifyListeners('vite:error', payload);
            console.error(`[ember] Internal Server Error\n${payload.err.message}\n${payload.err.stack || ''}`);
            break;
        case 'custom':
            notifyListeners(payload.event, payload.data);
            break;
        default:
            console.warn('[ember] Ignoring unrecognized message:', payload.type);
    }
}

async function fetchUpdate({ path, acceptedPath, timestamp }) {
    const dispose = disposeMap.get(path);
    if (dispose) {
        await dispose(getData(path));
    }

    let mod;
    try {
        mod = await import(`${acceptedPath}?t=${timestamp}`);
    } catch (error) {
        console.error(
            `[ember] Failed to reload ${acceptedPath}. ` +
            'This could be due to syntax errors or importing non-existent modules.',
            error
        );
        notifyListeners('vite:error', { err: { message: String(error) }, path: acceptedPath });
        location.reload();
        return false;
    }

    const entries = (hotModulesMap.get(path) || []).slice();
    for (const { deps, fn } of entries) {
        if (acceptedPath && deps.some((dep) => dep.includes(acceptedPath))) {
            fn(mod);
        }
    }
    console.debug(`[ember] hot updated: ${acceptedPath}`);
    return true;
}

function pruneModule(path) {
    const data = getData(path);
    const dispose = disposeMap.get(path);
    if (dispose) {
        dispose(data);
    }
    const prune = pruneMap.get(path);
    if (prune) {
        prune(data);
    }
    hotModulesMap.delete(path);
    disposeMap.delete(path);
    pruneMap.delete(path);
    dataMap.delete(path);
}

function getData(path) {
    if (!dataMap.has(path)) {
        dataMap.set(path, {});
    }
    return dataMap.get(path);
}

function notifyListeners(event, data) {
    const listeners = customListenersMap.get(event);
    if (listeners) {
        for (const listener of listeners.slice()) {
            listener(data);
        }
    }
}

function sendCustom(event, data) {
    const message = JSON.stringify({ type: 'custom', event, data });
    if (socket.readyState === WebSocket.OPEN) {
        socket.send(message);
    } else {
        socket.addEventListener('open', () => socket.send(message), { once: true });
    }
}

export function createHotContext(ownerPath) {
    getData(ownerPath);
    // a new instance starts without the callbacks of the one it replaces
    hotModulesMap.set(ownerPath, []);
    disposeMap.delete(ownerPath);
    pruneMap.delete(ownerPath);

    const acceptDeps = (deps, callback = () => {}) => {
        const entries = hotModulesMap.get(ownerPath) || [];
        entries.push({ deps, fn: callback });
        hotModulesMap.set(ownerPath, entries);
    };

    return {
        get data() {
            return getData(ownerPath);
        },
        accept(deps, callback) {
            if (typeof deps === 'function' || !deps) {
                acceptDeps([ownerPath], deps);
            } else if (typeof deps === 'string') {
                acceptDeps([deps], callback);
            } else if (Array.isArray(deps)) {
                acceptDeps(deps, callback);
            } else {
                throw new Error('invalid hot.accept() usage.');
            }
        },
        dispose(callback) {
            disposeMap.set(ownerPath, callback);
        },
        prune(callback) {
            pruneMap.set(ownerPath, callback);
        },
        invalidate() {
            notifyListeners('vite:invalidate', { path: ownerPath });
            sendCustom('vite:invalidate', { path: ownerPath });
        },
        on(event, callback) {
            const listeners = customListenersMap.get(event) || [];
            listeners.push(callback);
            customListenersMap.set(event, listeners);
        },
        off(event, callback) {
            const listeners = customListenersMap.get(event);
            if (listeners) {
                customListenersMap.set(event, listeners.filter((l) => l !== callback));
            }
        },
        send(event, data) {
            sendCustom(event, data);
        },
    };
}
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_code_targets_configured_socket() {
        let code = generate_hmr_client_code("127.0.0.1", 5173);
        assert!(code.contains(r#"const socketHost = "127.0.0.1";"#));
        assert!(code.contains("const socketPort = 5173;"));
        assert!(!code.contains("__EMBER_HMR_"));
    }

    #[test]
    fn test_client_code_exports_create_hot_context() {
        let code = generate_hmr_client_code("localhost", 3000);
        assert!(code.contains("export function createHotContext(ownerPath)"));
        for message in ["'connected'", "'update'", "'prune'", "'full-reload'", "'error'", "'custom'"] {
            assert!(code.contains(message), "missing handler for {}", message);
        }
    }

    #[test]
    fn test_client_code_resets_callbacks_per_instance() {
        let code = generate_hmr_client_code("localhost", 3000);
        let body = &code[code.find("export function createHotContext").unwrap()..];
        assert!(body.contains("hotModulesMap.set(ownerPath, []);"));
        assert!(body.contains("disposeMap.delete(ownerPath);"));
        assert!(body.contains("pruneMap.delete(ownerPath);"));
        assert!(code.contains("dep.includes(acceptedPath)"));
    }
}
