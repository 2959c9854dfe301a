//! JavaScript prelude evaluated before any page script.
//!
//! The prelude implements the whole mock-DOM and mock-Web-API surface in
//! plain ES6 so the engine side stays small: Rust only seeds the document
//! tree, bridges `__host_fetch`/`__host_log`, and drives the virtual
//! timer queue. Everything here runs inside the isolated boa context and
//! never sees host globals.

/// DOM: node classes, a tolerant fragment parser, a small selector
/// engine, and HTML serialization.
pub const PRELUDE_DOM: &str = r##"
'use strict';
var __scriptErrors = [];
var VOID_TAGS = {area:1,base:1,br:1,col:1,embed:1,hr:1,img:1,input:1,link:1,meta:1,param:1,source:1,track:1,wbr:1};

function __escapeText(s) {
  return String(s).replace(/&/g, '&amp;').replace(/</g, '&lt;').replace(/>/g, '&gt;');
}
function __escapeAttr(s) {
  return __escapeText(s).replace(/"/g, '&quot;');
}
function __decodeEntities(s) {
  return String(s)
    .replace(/&nbsp;/g, ' ')
    .replace(/&lt;/g, '<')
    .replace(/&gt;/g, '>')
    .replace(/&quot;/g, '"')
    .replace(/&#39;/g, "'")
    .replace(/&amp;/g, '&');
}

class SandboxText {
  constructor(text) {
    this.nodeType = 3;
    this.nodeName = '#text';
    this.data = String(text);
    this.parentNode = null;
  }
  get textContent() { return this.data; }
  set textContent(v) { this.data = String(v); }
  get outerHTML() { return __escapeText(this.data); }
  cloneNode() { return new SandboxText(this.data); }
}

class SandboxElement {
  constructor(tag) {
    this.nodeType = 1;
    this.tagName = String(tag).toUpperCase();
    this.attributes = {};
    this.childNodes = [];
    this.parentNode = null;
    this.style = {};
    this.__listeners = {};
  }
  get nodeName() { return this.tagName; }
  get id() { return this.attributes.id || ''; }
  set id(v) { this.attributes.id = String(v); }
  get className() { return this.attributes['class'] || ''; }
  set className(v) { this.attributes['class'] = String(v); }
  get classList() {
    var el = this;
    function names() { return el.className.split(/\s+/).filter(function(c) { return c.length > 0; }); }
    return {
      add: function(c) { var n = names(); if (n.indexOf(c) < 0) { n.push(c); el.className = n.join(' '); } },
      remove: function(c) { el.className = names().filter(function(x) { return x !== c; }).join(' '); },
      contains: function(c) { return names().indexOf(c) >= 0; },
      toggle: function(c) { if (this.contains(c)) { this.remove(c); return false; } this.add(c); return true; }
    };
  }
  get children() { return this.childNodes.filter(function(n) { return n.nodeType === 1; }); }
  get firstChild() { return this.childNodes[0] || null; }
  get lastChild() { return this.childNodes[this.childNodes.length - 1] || null; }
  get firstElementChild() { return this.children[0] || null; }

  get textContent() {
    var out = '';
    for (var i = 0; i < this.childNodes.length; i++) { out += this.childNodes[i].textContent; }
    return out;
  }
  set textContent(v) {
    var t = new SandboxText(v);
    t.parentNode = this;
    this.childNodes = [t];
  }
  get innerText() { return this.textContent; }
  set innerText(v) { this.textContent = v; }

  get innerHTML() {
    var out = '';
    for (var i = 0; i < this.childNodes.length; i++) { out += this.childNodes[i].outerHTML; }
    return out;
  }
  set innerHTML(v) {
    var nodes = __parseHTML(String(v));
    for (var i = 0; i < nodes.length; i++) { nodes[i].parentNode = this; }
    this.childNodes = nodes;
  }
  get outerHTML() {
    var tag = this.tagName.toLowerCase();
    var out = '<' + tag;
    for (var name in this.attributes) {
      out += ' ' + name + '="' + __escapeAttr(this.attributes[name]) + '"';
    }
    out += '>';
    if (VOID_TAGS[tag]) { return out; }
    return out + this.innerHTML + '</' + tag + '>';
  }

  appendChild(node) {
    if (node.parentNode) { node.parentNode.removeChild(node); }
    node.parentNode = this;
    this.childNodes.push(node);
    return node;
  }
  removeChild(node) {
    var idx = this.childNodes.indexOf(node);
    if (idx >= 0) { this.childNodes.splice(idx, 1); node.parentNode = null; }
    return node;
  }
  insertBefore(node, ref) {
    if (!ref) { return this.appendChild(node); }
    if (node.parentNode) { node.parentNode.removeChild(node); }
    var idx = this.childNodes.indexOf(ref);
    if (idx < 0) { return this.appendChild(node); }
    node.parentNode = this;
    this.childNodes.splice(idx, 0, node);
    return node;
  }
  remove() { if (this.parentNode) { this.parentNode.removeChild(this); } }

  setAttribute(name, value) { this.attributes[String(name).toLowerCase()] = String(value); }
  getAttribute(name) {
    var v = this.attributes[String(name).toLowerCase()];
    return v === undefined ? null : v;
  }
  hasAttribute(name) { return this.attributes[String(name).toLowerCase()] !== undefined; }
  removeAttribute(name) { delete this.attributes[String(name).toLowerCase()]; }

  addEventListener(type, fn) {
    if (!this.__listeners[type]) { this.__listeners[type] = []; }
    this.__listeners[type].push(fn);
  }
  removeEventListener(type, fn) {
    if (this.__listeners[type]) {
      this.__listeners[type] = this.__listeners[type].filter(function(f) { return f !== fn; });
    }
  }
  dispatchEvent() { return true; }
  getBoundingClientRect() { return {top:0,left:0,right:0,bottom:0,width:0,height:0,x:0,y:0}; }
  focus() {}
  blur() {}
  click() {}

  matches(selector) { return __matchesSelector(this, selector); }
  querySelector(selector) { return __query(this, selector, true); }
  querySelectorAll(selector) { return __query(this, selector, false); }
  getElementsByTagName(tag) {
    tag = String(tag).toUpperCase();
    return __collect(this, function(el) { return tag === '*' || el.tagName === tag; });
  }
  getElementsByClassName(cls) {
    return __collect(this, function(el) { return el.classList.contains(cls); });
  }
  cloneNode(deep) {
    var copy = new SandboxElement(this.tagName);
    for (var name in this.attributes) { copy.attributes[name] = this.attributes[name]; }
    if (deep) {
      for (var i = 0; i < this.childNodes.length; i++) {
        copy.appendChild(this.childNodes[i].cloneNode(true));
      }
    }
    return copy;
  }
}

function __collect(root, pred) {
  var out = [];
  (function walk(node) {
    var kids = node.childNodes;
    for (var i = 0; i < kids.length; i++) {
      var kid = kids[i];
      if (kid.nodeType === 1) {
        if (pred(kid)) { out.push(kid); }
        walk(kid);
      }
    }
  })(root);
  return out;
}

function __findTagEnd(html, from) {
  var quote = null;
  for (var i = from + 1; i < html.length; i++) {
    var c = html[i];
    if (quote) { if (c === quote) { quote = null; } }
    else if (c === '"' || c === "'") { quote = c; }
    else if (c === '>') { return i; }
  }
  return -1;
}

var __ATTR_RE = /([a-zA-Z_:][-a-zA-Z0-9_:.]*)\s*(?:=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+)))?/g;
function __parseAttrs(raw, el) {
  __ATTR_RE.lastIndex = 0;
  var m;
  while ((m = __ATTR_RE.exec(raw)) !== null) {
    var value = m[2] !== undefined ? m[2] : (m[3] !== undefined ? m[3] : (m[4] !== undefined ? m[4] : ''));
    el.attributes[m[1].toLowerCase()] = __decodeEntities(value);
  }
}

function __appendText(parent, text) {
  if (text.length === 0) { return; }
  var t = new SandboxText(__decodeEntities(text));
  t.parentNode = parent;
  parent.childNodes.push(t);
}

// Tolerant HTML fragment parser: enough for server-rendered markup and
// the strings page scripts assign to innerHTML. Unknown constructs are
// skipped rather than failing.
function __parseHTML(html) {
  var root = new SandboxElement('#fragment');
  var stack = [root];
  var i = 0;
  var n = html.length;
  while (i < n) {
    var lt = html.indexOf('<', i);
    if (lt < 0) { __appendText(stack[stack.length - 1], html.slice(i)); break; }
    if (lt > i) { __appendText(stack[stack.length - 1], html.slice(i, lt)); }
    if (html.startsWith('<!--', lt)) {
      var ce = html.indexOf('-->', lt + 4);
      i = ce < 0 ? n : ce + 3;
      continue;
    }
    if (html[lt + 1] === '!' || html[lt + 1] === '?') {
      var de = html.indexOf('>', lt);
      i = de < 0 ? n : de + 1;
      continue;
    }
    if (html[lt + 1] === '/') {
      var gt0 = html.indexOf('>', lt);
      var name = html.slice(lt + 2, gt0 < 0 ? n : gt0).trim().toUpperCase();
      for (var s = stack.length - 1; s > 0; s--) {
        if (stack[s].tagName === name) { stack.length = s; break; }
      }
      i = gt0 < 0 ? n : gt0 + 1;
      continue;
    }
    var gt = __findTagEnd(html, lt);
    if (gt < 0) { __appendText(stack[stack.length - 1], html.slice(lt)); break; }
    var raw = html.slice(lt + 1, gt).trim();
    var selfClose = raw.endsWith('/');
    if (selfClose) { raw = raw.slice(0, -1); }
    var tm = raw.match(/^[a-zA-Z][a-zA-Z0-9-]*/);
    if (!tm) { i = gt + 1; continue; }
    var tag = tm[0].toLowerCase();
    var el = new SandboxElement(tag);
    __parseAttrs(raw.slice(tm[0].length), el);
    stack[stack.length - 1].appendChild(el);
    if (tag === 'script' || tag === 'style') {
      var lower = html.toLowerCase();
      var close = lower.indexOf('</' + tag, gt + 1);
      var rawText = html.slice(gt + 1, close < 0 ? n : close);
      if (rawText.length > 0) {
        var textNode = new SandboxText(rawText);
        textNode.parentNode = el;
        el.childNodes.push(textNode);
      }
      var cgt = close < 0 ? -1 : html.indexOf('>', close);
      i = cgt < 0 ? n : cgt + 1;
      continue;
    }
    if (!selfClose && !VOID_TAGS[tag]) { stack.push(el); }
    i = gt + 1;
  }
  return root.childNodes.slice();
}

// Selector engine: tag/#id/.class/[attr]/[attr=value] compounds,
// descendant combinator, comma lists.
function __parseSimple(simple) {
  var spec = {tag: null, id: null, classes: [], attrs: []};
  var re = /([a-zA-Z][a-zA-Z0-9-]*|\*)|#([-\w]+)|\.([-\w]+)|\[\s*([-\w]+)\s*(?:=\s*"?([^\]"]*)"?\s*)?\]/g;
  var m;
  while ((m = re.exec(simple)) !== null) {
    if (m[1]) { spec.tag = m[1] === '*' ? null : m[1].toUpperCase(); }
    else if (m[2]) { spec.id = m[2]; }
    else if (m[3]) { spec.classes.push(m[3]); }
    else if (m[4]) { spec.attrs.push({name: m[4].toLowerCase(), value: m[5] === undefined ? null : m[5]}); }
  }
  return spec;
}
function __matchesSimple(el, spec) {
  if (spec.tag && el.tagName !== spec.tag) { return false; }
  if (spec.id && el.id !== spec.id) { return false; }
  for (var i = 0; i < spec.classes.length; i++) {
    if (!el.classList.contains(spec.classes[i])) { return false; }
  }
  for (var j = 0; j < spec.attrs.length; j++) {
    var a = spec.attrs[j];
    var v = el.getAttribute(a.name);
    if (v === null) { return false; }
    if (a.value !== null && v !== a.value) { return false; }
  }
  return true;
}
function __matchesSelector(el, selector) {
  var alternatives = String(selector).split(',');
  for (var i = 0; i < alternatives.length; i++) {
    var parts = alternatives[i].trim().split(/\s+/).map(__parseSimple);
    if (parts.length === 0) { continue; }
    if (!__matchesSimple(el, parts[parts.length - 1])) { continue; }
    var idx = parts.length - 2;
    var node = el.parentNode;
    while (idx >= 0 && node && node.nodeType === 1) {
      if (__matchesSimple(node, parts[idx])) { idx--; }
      node = node.parentNode;
    }
    if (idx < 0) { return true; }
  }
  return false;
}
function __query(root, selector, first) {
  var matches = __collect(root, function(el) { return __matchesSelector(el, selector); });
  return first ? (matches[0] || null) : matches;
}

class SandboxDocument extends SandboxElement {
  constructor() {
    super('#document');
    this.nodeType = 9;
    this.readyState = 'complete';
    this.cookie = '';
  }
  get documentElement() {
    return this.children.filter(function(el) { return el.tagName === 'HTML'; })[0] || null;
  }
  get head() { return this.querySelector('head'); }
  get body() { return this.querySelector('body'); }
  get title() {
    var t = this.querySelector('title');
    return t ? t.textContent : '';
  }
  set title(v) {
    var t = this.querySelector('title');
    if (t) { t.textContent = v; }
  }
  getElementById(id) {
    return __collect(this, function(el) { return el.id === String(id); })[0] || null;
  }
  createElement(tag) { return new SandboxElement(tag); }
  createTextNode(text) { return new SandboxText(text); }
  createDocumentFragment() { return new SandboxElement('#fragment'); }
  write() {}
  open() {}
  close() {}
}

var document = new SandboxDocument();

function __buildNode(spec) {
  if (spec.t === 'tx') { return new SandboxText(spec.text); }
  var el = new SandboxElement(spec.tag);
  if (spec.attrs) {
    for (var name in spec.attrs) { el.attributes[name] = spec.attrs[name]; }
  }
  if (spec.ch) {
    for (var i = 0; i < spec.ch.length; i++) { el.appendChild(__buildNode(spec.ch[i])); }
  }
  return el;
}

function __seedDocument(tree) {
  document.childNodes = [];
  document.appendChild(__buildNode(tree));
}

function __serializeDocument() {
  var root = document.documentElement;
  return root ? '<!DOCTYPE html>' + root.outerHTML : '';
}
"##;

/// Environment: window/location/navigator/history stubs, storages,
/// observers, timers with a virtual clock, base64 helpers, URL shims.
pub const PRELUDE_ENV: &str = r##"
var window = globalThis;
window.self = window;
window.window = window;
window.top = window;
window.parent = window;
window.document = document;
window.frames = [];
window.innerWidth = 1280;
window.innerHeight = 800;
window.devicePixelRatio = 1;
window.getComputedStyle = function() { return {getPropertyValue: function() { return ''; }}; };
window.matchMedia = function(q) {
  return {matches: false, media: String(q), addListener: function() {}, removeListener: function() {},
          addEventListener: function() {}, removeEventListener: function() {}};
};
window.scrollTo = function() {};
window.scrollBy = function() {};
window.alert = function() {};
window.confirm = function() { return false; };
window.prompt = function() { return null; };
window.open = function() { return null; };
window.addEventListener = function() {};
window.removeEventListener = function() {};
window.dispatchEvent = function() { return true; };

var location = {
  href: '', protocol: 'https:', host: '', hostname: '', port: '',
  pathname: '/', search: '', hash: '', origin: '',
  assign: function() {}, replace: function() {}, reload: function() {},
  toString: function() { return this.href; }
};
window.location = location;

function __initEnv(env) {
  location.href = env.href;
  location.protocol = env.protocol;
  location.host = env.host;
  location.hostname = env.hostname;
  location.port = env.port;
  location.pathname = env.pathname;
  location.search = env.search;
  location.hash = env.hash;
  location.origin = env.origin;
  navigator.userAgent = env.userAgent;
  document.cookie = env.cookieHeader || '';
}

var navigator = {
  userAgent: '', language: 'en-US', languages: ['en-US', 'en'],
  platform: 'Linux x86_64', webdriver: false, cookieEnabled: true,
  hardwareConcurrency: 4, maxTouchPoints: 0,
  plugins: [], mimeTypes: [],
  sendBeacon: function() { return true; }
};
window.navigator = navigator;

var history = {
  length: 1, state: null,
  pushState: function(state) { this.state = state; },
  replaceState: function(state) { this.state = state; },
  back: function() {}, forward: function() {}, go: function() {}
};
window.history = history;

var screen = {width: 1920, height: 1080, availWidth: 1920, availHeight: 1040, colorDepth: 24, pixelDepth: 24};
window.screen = screen;

function __makeStorage() {
  var data = {};
  return {
    getItem: function(k) { return Object.prototype.hasOwnProperty.call(data, k) ? data[k] : null; },
    setItem: function(k, v) { data[k] = String(v); },
    removeItem: function(k) { delete data[k]; },
    clear: function() { data = {}; },
    key: function(i) { return Object.keys(data)[i] || null; },
    get length() { return Object.keys(data).length; }
  };
}
var localStorage = __makeStorage();
var sessionStorage = __makeStorage();
window.localStorage = localStorage;
window.sessionStorage = sessionStorage;

class MutationObserver {
  constructor() {}
  observe() {}
  disconnect() {}
  takeRecords() { return []; }
}
class IntersectionObserver {
  constructor() {}
  observe() {}
  unobserve() {}
  disconnect() {}
}
class ResizeObserver {
  constructor() {}
  observe() {}
  unobserve() {}
  disconnect() {}
}
window.MutationObserver = MutationObserver;
window.IntersectionObserver = IntersectionObserver;
window.ResizeObserver = ResizeObserver;

function Worker() { throw new Error('Worker is not available in this sandbox'); }
function WebSocket() { throw new Error('WebSocket is not available in this sandbox'); }
window.Worker = Worker;
window.WebSocket = WebSocket;

// Virtual timer queue. Delays are capped; time only advances when the
// host drains the queue after the script phase.
var __virtualNow = 0;
var __timerSeq = 1;
var __timerQueue = [];
var TIMER_DELAY_CAP_MS = 5000;

function setTimeout(fn, delay) {
  if (typeof fn !== 'function') { return 0; }
  var d = Number(delay) || 0;
  if (d < 0) { d = 0; }
  if (d > TIMER_DELAY_CAP_MS) { d = TIMER_DELAY_CAP_MS; }
  var extra = [];
  for (var i = 2; i < arguments.length; i++) { extra.push(arguments[i]); }
  var id = __timerSeq++;
  __timerQueue.push({id: id, at: __virtualNow + d, fn: fn, args: extra});
  return id;
}
function clearTimeout(id) {
  __timerQueue = __timerQueue.filter(function(t) { return t.id !== id; });
}
function setInterval() { return 0; }
function clearInterval() {}
function requestAnimationFrame(fn) { return setTimeout(fn, 16); }
function cancelAnimationFrame(id) { clearTimeout(id); }
function queueMicrotask(fn) { Promise.resolve().then(fn); }

// Runs the next due timer within the budget. Returns true when one ran;
// the host interleaves microtask draining between calls.
function __runNextTimer(budgetMs) {
  if (__timerQueue.length === 0) { return false; }
  var best = 0;
  for (var i = 1; i < __timerQueue.length; i++) {
    if (__timerQueue[i].at < __timerQueue[best].at) { best = i; }
  }
  var timer = __timerQueue[best];
  if (timer.at > budgetMs) { return false; }
  __timerQueue.splice(best, 1);
  __virtualNow = timer.at;
  try { timer.fn.apply(window, timer.args); }
  catch (e) { __scriptErrors.push('timer: ' + String(e)); }
  return true;
}

var performance = {
  now: function() { return __virtualNow; },
  timing: {}, mark: function() {}, measure: function() {},
  getEntriesByType: function() { return []; }
};
window.performance = performance;

var __B64_CHARS = 'ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/';
function btoa(input) {
  var str = String(input);
  var out = '';
  for (var i = 0; i < str.length; i += 3) {
    var a = str.charCodeAt(i);
    var b = i + 1 < str.length ? str.charCodeAt(i + 1) : NaN;
    var c = i + 2 < str.length ? str.charCodeAt(i + 2) : NaN;
    out += __B64_CHARS.charAt(a >> 2);
    out += __B64_CHARS.charAt(((a & 3) << 4) | (isNaN(b) ? 0 : (b >> 4)));
    out += isNaN(b) ? '=' : __B64_CHARS.charAt(((b & 15) << 2) | (isNaN(c) ? 0 : (c >> 6)));
    out += isNaN(c) ? '=' : __B64_CHARS.charAt(c & 63);
  }
  return out;
}
function atob(input) {
  var str = String(input).replace(/=+$/, '');
  var out = '';
  var bits = 0;
  var buffer = 0;
  for (var i = 0; i < str.length; i++) {
    var v = __B64_CHARS.indexOf(str.charAt(i));
    if (v < 0) { continue; }
    buffer = (buffer << 6) | v;
    bits += 6;
    if (bits >= 8) {
      bits -= 8;
      out += String.fromCharCode((buffer >> bits) & 255);
    }
  }
  return out;
}
window.btoa = btoa;
window.atob = atob;

class URLSearchParams {
  constructor(init) {
    this.__pairs = [];
    if (typeof init === 'string') {
      var query = init.charAt(0) === '?' ? init.slice(1) : init;
      if (query.length > 0) {
        var parts = query.split('&');
        for (var i = 0; i < parts.length; i++) {
          var eq = parts[i].indexOf('=');
          if (eq < 0) { this.__pairs.push([decodeURIComponent(parts[i]), '']); }
          else {
            this.__pairs.push([
              decodeURIComponent(parts[i].slice(0, eq)),
              decodeURIComponent(parts[i].slice(eq + 1).replace(/\+/g, ' '))
            ]);
          }
        }
      }
    }
  }
  get(name) {
    for (var i = 0; i < this.__pairs.length; i++) {
      if (this.__pairs[i][0] === name) { return this.__pairs[i][1]; }
    }
    return null;
  }
  getAll(name) {
    return this.__pairs.filter(function(p) { return p[0] === name; }).map(function(p) { return p[1]; });
  }
  has(name) { return this.get(name) !== null; }
  set(name, value) {
    this.delete(name);
    this.__pairs.push([String(name), String(value)]);
  }
  append(name, value) { this.__pairs.push([String(name), String(value)]); }
  delete(name) { this.__pairs = this.__pairs.filter(function(p) { return p[0] !== name; }); }
  forEach(fn) {
    for (var i = 0; i < this.__pairs.length; i++) { fn(this.__pairs[i][1], this.__pairs[i][0], this); }
  }
  toString() {
    return this.__pairs.map(function(p) {
      return encodeURIComponent(p[0]) + '=' + encodeURIComponent(p[1]);
    }).join('&');
  }
}
window.URLSearchParams = URLSearchParams;

class URL {
  constructor(input, base) {
    var href = String(input);
    var m = href.match(/^([a-zA-Z][a-zA-Z0-9+.-]*:)\/\/([^\/?#]*)([^?#]*)(\?[^#]*)?(#.*)?$/);
    if (!m && base) {
      var b = new URL(base);
      if (href.charAt(0) === '/') { href = b.origin + href; }
      else if (href.charAt(0) === '?') { href = b.origin + b.pathname + href; }
      else if (href.charAt(0) === '#') { href = b.origin + b.pathname + b.search + href; }
      else {
        var dir = b.pathname.slice(0, b.pathname.lastIndexOf('/') + 1);
        href = b.origin + dir + href;
      }
      m = href.match(/^([a-zA-Z][a-zA-Z0-9+.-]*:)\/\/([^\/?#]*)([^?#]*)(\?[^#]*)?(#.*)?$/);
    }
    if (!m) { throw new TypeError('Invalid URL: ' + input); }
    this.protocol = m[1];
    this.host = m[2];
    var colon = m[2].lastIndexOf(':');
    this.hostname = colon > 0 ? m[2].slice(0, colon) : m[2];
    this.port = colon > 0 ? m[2].slice(colon + 1) : '';
    this.pathname = m[3] || '/';
    this.search = m[4] || '';
    this.hash = m[5] || '';
    this.origin = this.protocol + '//' + this.host;
    this.href = this.origin + this.pathname + this.search + this.hash;
    this.searchParams = new URLSearchParams(this.search);
  }
  toString() { return this.href; }
}
window.URL = URL;

var console = {
  log: function() { __host_log('log', Array.prototype.slice.call(arguments).join(' ')); },
  info: function() { __host_log('info', Array.prototype.slice.call(arguments).join(' ')); },
  warn: function() { __host_log('warn', Array.prototype.slice.call(arguments).join(' ')); },
  error: function() { __host_log('error', Array.prototype.slice.call(arguments).join(' ')); },
  debug: function() {}, trace: function() {}, table: function() {},
  group: function() {}, groupEnd: function() {}, time: function() {}, timeEnd: function() {}
};
window.console = console;
"##;

/// Networking: `fetch` and `XMLHttpRequest` bridged through
/// `__host_fetch`, which routes into the host HTTP client and cookie
/// jar so sandboxed scripts participate in session state.
pub const PRELUDE_NET: &str = r##"
function __makeResponse(data) {
  return {
    ok: data.status >= 200 && data.status < 300,
    status: data.status,
    statusText: '',
    url: data.finalUrl,
    redirected: false,
    headers: {
      get: function(name) {
        var v = data.headers[String(name).toLowerCase()];
        return v === undefined ? null : v;
      },
      has: function(name) { return data.headers[String(name).toLowerCase()] !== undefined; }
    },
    text: function() { return Promise.resolve(data.body); },
    json: function() {
      try { return Promise.resolve(JSON.parse(data.body)); }
      catch (e) { return Promise.reject(e); }
    },
    clone: function() { return __makeResponse(data); }
  };
}

function fetch(input, init) {
  try {
    var raw = __host_fetch(String(input), JSON.stringify(init || {}));
    var data = JSON.parse(raw);
    if (data.error) { return Promise.reject(new TypeError(data.error)); }
    return Promise.resolve(__makeResponse(data));
  } catch (e) {
    return Promise.reject(e);
  }
}
window.fetch = fetch;

class XMLHttpRequest {
  constructor() {
    this.readyState = 0;
    this.status = 0;
    this.responseText = '';
    this.response = '';
    this.responseURL = '';
    this.onreadystatechange = null;
    this.onload = null;
    this.onerror = null;
    this.__method = 'GET';
    this.__url = '';
    this.__headers = {};
  }
  open(method, url) {
    this.__method = String(method || 'GET');
    this.__url = String(url);
    this.readyState = 1;
  }
  setRequestHeader(name, value) { this.__headers[String(name)] = String(value); }
  getResponseHeader() { return null; }
  getAllResponseHeaders() { return ''; }
  abort() {}
  send(body) {
    var xhr = this;
    try {
      var raw = __host_fetch(this.__url, JSON.stringify({
        method: this.__method,
        headers: this.__headers,
        body: body === undefined || body === null ? null : String(body)
      }));
      var data = JSON.parse(raw);
      if (data.error) { throw new Error(data.error); }
      xhr.status = data.status;
      xhr.responseText = data.body;
      xhr.response = data.body;
      xhr.responseURL = data.finalUrl;
      xhr.readyState = 4;
      if (typeof xhr.onreadystatechange === 'function') { xhr.onreadystatechange(); }
      if (typeof xhr.onload === 'function') { xhr.onload(); }
    } catch (e) {
      xhr.readyState = 4;
      xhr.status = 0;
      if (typeof xhr.onreadystatechange === 'function') { xhr.onreadystatechange(); }
      if (typeof xhr.onerror === 'function') { xhr.onerror(e); }
    }
  }
}
window.XMLHttpRequest = XMLHttpRequest;
"##;
